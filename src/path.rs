/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Materialized post paths
//!
//! A path is the sequence of post ids from the root of a reply tree down to
//! the post itself. Posts ids grow in creation order, so ordering paths
//! lexicographically yields a depth-first walk of the tree with siblings in
//! creation order.
//!
//! Paths are stored as text: every id is written as a zero-padded decimal of
//! [`SEGMENT_WIDTH`] digits with no separator. Since all segments have the
//! same width, byte order of the text matches the order of the id sequences.

use std::fmt;

use thiserror::Error;

/// Digits per id in the text encoding (enough for any positive `i64`).
pub const SEGMENT_WIDTH: usize = 19;

#[derive(Error, Debug, PartialEq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("path length {0} is not a multiple of the segment width")]
    Misaligned(usize),
    #[error("invalid path segment '{0}'")]
    InvalidSegment(String),
}

/// Ids from the root post down to a post. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostPath(Vec<i64>);

impl PostPath {
    pub fn root(id: i64) -> PostPath {
        PostPath(vec![id])
    }

    pub fn child(&self, id: i64) -> PostPath {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(id);
        PostPath(ids)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    /// Id of the post this path leads to.
    pub fn id(&self) -> i64 {
        self.0[self.0.len() - 1]
    }

    pub fn root_id(&self) -> i64 {
        self.0[0]
    }

    /// Id of the parent post, 0 for a root post.
    pub fn parent_id(&self) -> i64 {
        if self.0.len() < 2 {
            0
        } else {
            self.0[self.0.len() - 2]
        }
    }

    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    pub fn is_ancestor_of(&self, other: &PostPath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    pub fn encode(&self) -> String {
        let mut encoded = String::with_capacity(self.0.len() * SEGMENT_WIDTH);
        for id in &self.0 {
            encoded.push_str(&format!("{:0width$}", id, width = SEGMENT_WIDTH));
        }
        encoded
    }

    pub fn decode(encoded: &str) -> Result<PostPath, PathError> {
        if encoded.is_empty() {
            return Err(PathError::Empty);
        }
        if encoded.len() % SEGMENT_WIDTH != 0 {
            return Err(PathError::Misaligned(encoded.len()));
        }
        let mut ids = Vec::with_capacity(encoded.len() / SEGMENT_WIDTH);
        for start in (0..encoded.len()).step_by(SEGMENT_WIDTH) {
            let segment = encoded.get(start..start + SEGMENT_WIDTH)
                .ok_or_else(|| PathError::InvalidSegment(encoded.to_owned()))?;
            let id: i64 = segment.parse()
                .map_err(|_| PathError::InvalidSegment(segment.to_owned()))?;
            ids.push(id);
        }
        Ok(PostPath(ids))
    }
}

impl fmt::Display for PostPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "{}", ids.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends_parent() {
        let root = PostPath::root(1);
        let child = root.child(2);
        let grandchild = child.child(7);
        assert_eq!(root.ids(), &[1]);
        assert_eq!(child.ids(), &[1, 2]);
        assert_eq!(grandchild.ids(), &[1, 2, 7]);
        assert_eq!(grandchild.id(), 7);
        assert_eq!(grandchild.parent_id(), 2);
        assert_eq!(grandchild.root_id(), 1);
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(root.parent_id(), 0);
        assert!(root.is_ancestor_of(&grandchild));
        assert!(!grandchild.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
    }

    #[test]
    fn encoded_order_matches_preorder() {
        // 1
        // +- 2
        // |  +- 10
        // +- 4
        // 3
        let a = PostPath::root(1);
        let b = a.child(2);
        let c = PostPath::root(3);
        let d = a.child(4);
        let e = b.child(10);
        let mut paths = vec![c.clone(), e.clone(), d.clone(), a.clone(), b.clone()];
        paths.sort();
        assert_eq!(paths, vec![a.clone(), b.clone(), e.clone(), d.clone(), c.clone()]);

        let mut encoded: Vec<String> = paths.iter().rev().map(PostPath::encode).collect();
        encoded.sort();
        let decoded: Vec<PostPath> = encoded.iter()
            .map(|s| PostPath::decode(s).unwrap())
            .collect();
        assert_eq!(decoded, paths);
    }

    #[test]
    fn wide_ids_keep_their_order() {
        let small = PostPath::root(9).child(99);
        let large = PostPath::root(10);
        assert!(small.encode() < large.encode());
        let max = PostPath::root(i64::MAX);
        assert_eq!(max.encode().len(), SEGMENT_WIDTH);
        assert_eq!(PostPath::decode(&max.encode()).unwrap(), max);
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(PostPath::decode(""), Err(PathError::Empty));
        assert_eq!(PostPath::decode("123"), Err(PathError::Misaligned(3)));
        assert!(matches!(
            PostPath::decode("00000000000000000x1"),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn displays_dotted() {
        assert_eq!(PostPath::root(1).child(2).child(3).to_string(), "1.2.3");
    }
}
