use std::collections::HashMap;

use super::{CondensedCandidate, CondensedList, RankedList};

/// Group each query's matches by label, in order of first appearance
pub fn condense(lists: &[RankedList]) -> Vec<CondensedList> {
    lists
        .iter()
        .map(|list| {
            let mut groups: Vec<CondensedCandidate> = Vec::new();
            let mut positions: HashMap<&str, usize> = HashMap::new();

            for item in &list.response {
                let position = *positions.entry(item.label.as_str()).or_insert_with(|| {
                    groups.push(CondensedCandidate {
                        label: item.label.clone(),
                        descriptions: Vec::new(),
                        distances: Vec::new(),
                        ranks: Vec::new(),
                    });
                    groups.len() - 1
                });

                let group = &mut groups[position];
                group.descriptions.push(item.description.clone());
                group.distances.push(item.distance);
                group.ranks.push(item.rank);
            }

            CondensedList {
                input_id: list.input_id.clone(),
                response: groups,
            }
        })
        .collect()
}
