use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::Comment;

#[derive(Debug, Serialize, PartialEq)]
pub struct CommentNode {
    pub id: i32,
    pub author: String,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub replies: Vec<CommentNode>,
}

/// Assemble flat `(comment, author)` rows into reply threads.
///
/// A comment whose parent is absent from `rows` is promoted to a root.
/// Every level is ordered by creation time, then id.
pub fn build_tree(rows: Vec<(Comment, String)>) -> Vec<CommentNode> {
    let known: HashSet<i32> = rows.iter().map(|(c, _)| c.id).collect();

    let mut children: HashMap<Option<i32>, Vec<(Comment, String)>> = HashMap::new();
    for (comment, author) in rows {
        let parent = comment.parent_id.filter(|p| known.contains(p));
        children.entry(parent).or_default().push((comment, author));
    }

    attach(None, &mut children)
}

fn attach(
    parent: Option<i32>,
    children: &mut HashMap<Option<i32>, Vec<(Comment, String)>>,
) -> Vec<CommentNode> {
    let mut level = children.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| {
        a.0.created_at
            .cmp(&b.0.created_at)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });

    level
        .into_iter()
        .map(|(comment, author)| CommentNode {
            id: comment.id,
            replies: attach(Some(comment.id), children),
            author,
            content: comment.content,
            created_at: comment.created_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
    }

    fn row(id: i32, parent_id: Option<i32>, minute: u32) -> (Comment, String) {
        (
            Comment {
                id,
                video_id: 1,
                user_id: 1,
                parent_id,
                content: format!("comment {}", id),
                created_at: at(minute),
            },
            "alice".to_string(),
        )
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i32> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[test]
    fn nests_replies_under_parents() {
        let tree = build_tree(vec![
            row(1, None, 0),
            row(2, Some(1), 1),
            row(3, Some(2), 2),
            row(4, None, 3),
        ]);
        assert_eq!(ids(&tree), vec![1, 4]);
        assert_eq!(ids(&tree[0].replies), vec![2]);
        assert_eq!(ids(&tree[0].replies[0].replies), vec![3]);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn siblings_sorted_by_time_then_id() {
        let tree = build_tree(vec![
            row(5, Some(1), 9),
            row(1, None, 0),
            row(3, Some(1), 4),
            row(2, Some(1), 4),
        ]);
        assert_eq!(ids(&tree[0].replies), vec![2, 3, 5]);
    }

    #[test]
    fn orphans_become_roots() {
        let tree = build_tree(vec![row(7, Some(99), 0), row(8, None, 1)]);
        assert_eq!(ids(&tree), vec![7, 8]);
    }

    #[test]
    fn empty_input() {
        assert!(build_tree(Vec::new()).is_empty());
    }
}
