use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::dto::TreeNodeDto;
use crate::api::extract::AuthUser;
use crate::api::{ApiResponse, ApiResult, AppState};
use crate::domain::{LegSide, MemberId, TeamNode};
use crate::error::{AppError, ServiceError};

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatsResponse {
    pub left_count: i64,
    pub right_count: i64,
    pub left_active: i64,
    pub right_active: i64,
    pub left_carry: i64,
    pub right_carry: i64,
    pub left_pv_total: i64,
    pub right_pv_total: i64,
    pub matched_pv_total: i64,
    pub matching_income: String,
}

/// Nest `(node, level)` pairs into a tree rooted at `root`.
///
/// Nodes on `max_level` keep their `has_children` flag but no children.
fn build_tree(nodes: Vec<(TeamNode, u32)>, root: MemberId, max_level: u32) -> Option<TreeNodeDto> {
    let mut by_parent: HashMap<MemberId, Vec<TeamNode>> = HashMap::new();
    let mut root_node = None;
    for (node, _) in nodes {
        if node.id == root {
            root_node = Some(node);
        } else if let Some(parent) = node.parent_id {
            by_parent.entry(parent).or_default().push(node);
        }
    }
    for children in by_parent.values_mut() {
        children.sort_by_key(|c| c.side.map(|s| s == LegSide::Right));
    }

    fn attach(
        node: &TeamNode,
        level: u32,
        max_level: u32,
        by_parent: &HashMap<MemberId, Vec<TeamNode>>,
    ) -> TreeNodeDto {
        let mut dto = TreeNodeDto::leaf(node);
        if level < max_level {
            if let Some(children) = by_parent.get(&node.id) {
                dto.children = children
                    .iter()
                    .map(|child| attach(child, level + 1, max_level, by_parent))
                    .collect();
            }
        }
        dto
    }

    root_node.map(|node| attach(&node, 0, max_level, &by_parent))
}

pub async fn get_tree(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Query(params): Query<TreeQuery>,
) -> ApiResult<TreeNodeDto> {
    let depth = params.depth.unwrap_or(state.config.tree_default_depth);
    if depth == 0 {
        return Err(AppError::BadRequest("depth must be at least 1".to_string()));
    }
    let depth = depth.min(state.config.tree_max_depth);

    let nodes = state.repo.query_subtree(member.id, depth).await?;
    let tree = build_tree(nodes, member.id, depth)
        .ok_or_else(|| ServiceError::NotFound(format!("Member {}", member.id)))?;
    Ok(ApiResponse::ok(tree))
}

/// Immediate children of a node inside the caller's subtree.
pub async fn get_children(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Vec<TreeNodeDto>> {
    let node = MemberId::new(id);
    if !state.repo.is_in_subtree(member.id, node).await? {
        return Err(ServiceError::NotFound(format!("Node {}", id)).into());
    }
    let children = state.repo.query_children(node).await?;
    Ok(ApiResponse::ok(
        children.iter().map(TreeNodeDto::leaf).collect(),
    ))
}

pub async fn get_stats(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
) -> ApiResult<TeamStatsResponse> {
    let repo = &state.repo;
    let (left_count, left_active) = repo.leg_counts(member.id, LegSide::Left).await?;
    let (right_count, right_active) = repo.leg_counts(member.id, LegSide::Right).await?;
    let carry = repo.get_carry(member.id).await?.unwrap_or_default();
    let left_pv_total = repo.sum_pv_credited(member.id, LegSide::Left).await?;
    let right_pv_total = repo.sum_pv_credited(member.id, LegSide::Right).await?;
    let (matched_pv_total, income) = repo.matching_totals(member.id).await?;

    Ok(ApiResponse::ok(TeamStatsResponse {
        left_count,
        right_count,
        left_active,
        right_active,
        left_carry: carry.left,
        right_carry: carry.right,
        left_pv_total,
        right_pv_total,
        matched_pv_total,
        matching_income: income.to_canonical_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeMs;

    fn node(id: i64, parent: Option<i64>, side: Option<LegSide>, child_count: i64) -> TeamNode {
        TeamNode {
            id: MemberId::new(id),
            referral_code: format!("C{}", id),
            name: format!("N{}", id),
            parent_id: parent.map(MemberId::new),
            side,
            plan_id: None,
            joined_at: TimeMs::new(0),
            child_count,
        }
    }

    #[test]
    fn test_build_tree_orders_left_first_and_marks_cut() {
        let nodes = vec![
            (node(1, None, None, 2), 0),
            (node(3, Some(1), Some(LegSide::Right), 0), 1),
            (node(2, Some(1), Some(LegSide::Left), 1), 1),
        ];
        let tree = build_tree(nodes, MemberId::new(1), 1).unwrap();

        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].id, 2);
        assert_eq!(tree.children[1].id, 3);
        // Node 2 sits on the cut: children not inlined but flagged.
        assert!(tree.children[0].has_children);
        assert!(tree.children[0].children.is_empty());
        assert!(!tree.children[1].has_children);
    }

    #[test]
    fn test_build_tree_missing_root() {
        assert!(build_tree(Vec::new(), MemberId::new(1), 3).is_none());
    }
}
