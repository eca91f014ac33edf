// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node pool reconciliation helpers.

use chrono::Utc;
use cumulus_core::NodePool;
pub use cumulus_core::is_dns1123_label;

/// Compute the node pool set to send to the cloud for an update.
///
/// - requested pools that already exist keep their `id` and `created_at` and take
///   every other field from the request;
/// - requested pools that do not exist are additions (`id = None`);
/// - stored pools missing from the request come back with `to_delete = true`.
///
/// Order: requested pools in request order, then pools marked for deletion in
/// stored order.
pub fn compute_node_pool_update(stored: &[NodePool], requested: &[NodePool]) -> Vec<NodePool> {
    let mut result: Vec<NodePool> = requested
        .iter()
        .map(|wanted| match stored.iter().find(|s| s.name == wanted.name) {
            Some(existing) => NodePool {
                id: existing.id,
                created_at: existing.created_at,
                to_delete: false,
                ..wanted.clone()
            },
            None => NodePool {
                id: None,
                created_at: None,
                to_delete: false,
                ..wanted.clone()
            },
        })
        .collect();

    result.extend(
        stored
            .iter()
            .filter(|s| !requested.iter().any(|r| r.name == s.name))
            .map(|s| NodePool {
                to_delete: true,
                ..s.clone()
            }),
    );

    result
}

/// Give every pool without an id the next free id and a creation time.
pub fn assign_pool_ids(pools: &mut [NodePool]) {
    let mut next_id = pools.iter().filter_map(|p| p.id).max().unwrap_or(0) + 1;
    let now = Utc::now();
    for pool in pools.iter_mut().filter(|p| p.id.is_none()) {
        pool.id = Some(next_id);
        pool.created_at.get_or_insert(now);
        next_id += 1;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stored_pool(id: i64, name: &str, count: u32) -> NodePool {
        NodePool {
            id: Some(id),
            created_at: Some(Utc.with_ymd_and_hms(2025, 1, id as u32, 0, 0, 0).unwrap()),
            ..NodePool::new(name, "m5.large", count)
        }
    }

    #[test]
    fn test_delta_marks_missing_pools_for_deletion() {
        let stored = vec![
            stored_pool(1, "a", 1),
            stored_pool(2, "b", 1),
            stored_pool(3, "c", 1),
        ];
        let requested = vec![
            NodePool::new("a", "m5.xlarge", 3),
            NodePool::new("d", "m5.large", 2),
        ];

        let delta = compute_node_pool_update(&stored, &requested);
        assert_eq!(delta.len(), 4);

        let a = &delta[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.id, Some(1));
        assert_eq!(a.created_at, stored[0].created_at);
        assert_eq!(a.instance_type, "m5.xlarge");
        assert_eq!(a.count, 3);
        assert!(!a.to_delete);

        let d = &delta[1];
        assert_eq!(d.name, "d");
        assert_eq!(d.id, None);
        assert_eq!(d.created_at, None);
        assert!(!d.to_delete);

        let deleted: Vec<_> = delta
            .iter()
            .filter(|p| p.to_delete)
            .map(|p| (p.name.as_str(), p.id))
            .collect();
        assert_eq!(deleted, vec![("b", Some(2)), ("c", Some(3))]);
    }

    #[test]
    fn test_delta_of_identical_request_changes_nothing() {
        let stored = vec![stored_pool(1, "a", 2)];
        let delta = compute_node_pool_update(&stored, &stored);
        assert_eq!(delta, stored);
    }

    #[test]
    fn test_assign_pool_ids_continues_after_max() {
        let mut pools = vec![
            stored_pool(4, "a", 1),
            NodePool::new("b", "small", 1),
            NodePool::new("c", "small", 1),
        ];
        assign_pool_ids(&mut pools);

        assert_eq!(pools[0].id, Some(4));
        assert_eq!(pools[1].id, Some(5));
        assert_eq!(pools[2].id, Some(6));
        assert!(pools[2].created_at.is_some());
    }
}
