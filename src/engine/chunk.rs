//! Operation-aligned chunking of a compiled plan.
//!
//! A chunk is a contiguous slice of sub-commands dispatched to the command
//! stack as one undoable transaction. Splits happen only at operation
//! boundaries; an operation whose sub-commands alone exceed the threshold
//! still forms a single chunk. `per-operation` granularity places every
//! operation in its own chunk.

use super::subcommand::SubCommand;
use crate::plan::Granularity;

/// One operation's worth of compiled sub-commands.
#[derive(Debug)]
pub(crate) struct OpUnit {
    pub op_index: usize,
    pub commands: Vec<SubCommand>,
    /// Ids this operation creates, for post-chunk verification.
    pub created_element_ids: Vec<String>,
    pub created_relationship_ids: Vec<String>,
}

/// Partition operation units into chunks of at most `threshold`
/// sub-commands, preserving input order.
pub(crate) fn chunk_units(
    units: Vec<OpUnit>,
    threshold: usize,
    granularity: Granularity,
) -> Vec<Vec<OpUnit>> {
    let threshold = threshold.max(1);
    let mut chunks: Vec<Vec<OpUnit>> = Vec::new();
    let mut current: Vec<OpUnit> = Vec::new();
    let mut current_len = 0usize;

    for unit in units {
        let unit_len = unit.commands.len();
        let boundary = match granularity {
            Granularity::PerOperation => !current.is_empty(),
            Granularity::Batch => !current.is_empty() && current_len + unit_len > threshold,
        };
        if boundary {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += unit_len;
        current.push(unit);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(op_index: usize, n: usize) -> OpUnit {
        OpUnit {
            op_index,
            commands: (0..n)
                .map(|_| SubCommand::SetElementName {
                    id: "e".into(),
                    value: "x".into(),
                    old: None,
                })
                .collect(),
            created_element_ids: Vec::new(),
            created_relationship_ids: Vec::new(),
        }
    }

    fn shape(chunks: &[Vec<OpUnit>]) -> Vec<Vec<usize>> {
        chunks
            .iter()
            .map(|c| c.iter().map(|u| u.op_index).collect())
            .collect()
    }

    #[test]
    fn splits_at_operation_boundaries() {
        let chunks = chunk_units(
            vec![unit(0, 3), unit(1, 3), unit(2, 3)],
            5,
            Granularity::Batch,
        );
        assert_eq!(shape(&chunks), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn packs_up_to_threshold() {
        let chunks = chunk_units(
            vec![unit(0, 2), unit(1, 2), unit(2, 2)],
            4,
            Granularity::Batch,
        );
        assert_eq!(shape(&chunks), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn oversize_operation_forms_one_chunk() {
        let chunks = chunk_units(vec![unit(0, 10), unit(1, 1)], 4, Granularity::Batch);
        assert_eq!(shape(&chunks), vec![vec![0], vec![1]]);
    }

    #[test]
    fn threshold_one_isolates_every_operation() {
        let chunks = chunk_units(
            vec![unit(0, 2), unit(1, 2), unit(2, 2)],
            1,
            Granularity::Batch,
        );
        assert_eq!(shape(&chunks), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn per_operation_mode() {
        let chunks = chunk_units(
            vec![unit(0, 1), unit(1, 1)],
            100,
            Granularity::PerOperation,
        );
        assert_eq!(shape(&chunks), vec![vec![0], vec![1]]);
    }

    #[test]
    fn order_is_preserved_across_chunks() {
        let chunks = chunk_units(
            (0..7).map(|i| unit(i, 2)).collect(),
            4,
            Granularity::Batch,
        );
        let flat: Vec<usize> = chunks.iter().flatten().map(|u| u.op_index).collect();
        assert_eq!(flat, (0..7).collect::<Vec<_>>());
    }
}
