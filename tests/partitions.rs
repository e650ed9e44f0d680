use mincomplex::{Partition, RestrictedGrowth};
use std::collections::HashSet;

/// Bell numbers computed independently via the Bell triangle.
fn bell(r: u32) -> u64 {
    let mut row = vec![1u64];
    for _ in 1..r {
        let mut acc = *row.last().unwrap();
        let mut next = vec![acc];
        for &value in &row {
            acc += value;
            next.push(acc);
        }
        row = next;
    }
    *row.last().unwrap()
}

fn all_encodings(r: u32) -> Vec<Vec<u8>> {
    let mut generator = RestrictedGrowth::new(r);
    let mut encodings = Vec::new();
    while let Some(encoding) = generator.next_encoding() {
        encodings.push(encoding.to_vec());
    }
    encodings
}

#[test]
fn bell_triangle_matches_known_values() {
    let known = [1, 2, 5, 15, 52, 203];
    for (i, &expected) in known.iter().enumerate() {
        assert_eq!(bell(i as u32 + 1), expected);
    }
}

#[test]
fn enumerator_visits_each_partition_exactly_once() {
    for r in 1..=6 {
        let encodings = all_encodings(r);
        assert_eq!(encodings.len() as u64, bell(r), "count for r={}", r);

        let distinct: HashSet<_> = encodings.iter().cloned().collect();
        assert_eq!(distinct.len(), encodings.len(), "duplicates for r={}", r);
    }
}

#[test]
fn enumerator_output_is_restricted_growth() {
    for r in 1..=6 {
        for encoding in all_encodings(r) {
            assert_eq!(encoding[0], 0);
            let mut max = 0;
            for &label in &encoding {
                assert!(label <= max + 1, "label jump in {:?}", encoding);
                max = max.max(label);
            }
        }
    }
}

#[test]
fn enumerator_starts_single_block_and_ends_fully_split() {
    let encodings = all_encodings(4);
    assert_eq!(encodings.first().unwrap(), &vec![0, 0, 0, 0]);
    assert_eq!(encodings.last().unwrap(), &vec![0, 1, 2, 3]);
}

#[test]
fn enumerator_handles_single_element() {
    let mut generator = RestrictedGrowth::new(1);
    assert_eq!(generator.next_encoding(), Some(&[0u8][..]));
    assert_eq!(generator.next_encoding(), None);
    // The sequence is finite and stays finished.
    assert_eq!(generator.next_encoding(), None);
}

#[test]
fn decoded_partitions_are_valid_with_full_rank() {
    for r in 1..=6 {
        for encoding in all_encodings(r) {
            let partition = Partition::from_restricted_growth(&encoding);
            assert_eq!(partition.check(), (true, r), "encoding {:?}", encoding);
        }
    }
}

#[test]
fn decode_then_encode_round_trips() {
    for r in 1..=5 {
        for encoding in all_encodings(r) {
            let partition = Partition::from_restricted_growth(&encoding);
            assert_eq!(
                partition.to_restricted_growth(r),
                Some(encoding.clone()),
                "round trip of {:?}",
                encoding
            );

            // Relabeling the blocks must not change the canonical encoding.
            let reversed: Partition = partition.iter().rev().collect();
            assert_eq!(reversed.to_restricted_growth(r), Some(encoding.clone()));
        }
    }
}

#[test]
fn encode_rejects_non_partitions() {
    // Overlapping blocks.
    assert_eq!(
        Partition::from_blocks(&[0b011, 0b001]).to_restricted_growth(2),
        None
    );
    // An empty block.
    assert_eq!(
        Partition::from_blocks(&[0b011, 0b000]).to_restricted_growth(2),
        None
    );
    // Wrong width.
    assert_eq!(
        Partition::from_blocks(&[0b011]).to_restricted_growth(3),
        None
    );
    // Covers bits outside the requested range.
    assert_eq!(
        Partition::from_blocks(&[0b110]).to_restricted_growth(2),
        None
    );
}

#[test]
fn gap_decoding_accepts_only_trailing_exclusions() {
    // Excluded elements are the zero-labeled positions; they must form one
    // run at the start of the encoding, which is the trailing end of the
    // basis order.
    let (_, ok) = Partition::from_restricted_growth_with_gap(&[0, 0, 0]);
    assert!(ok);
    let (_, ok) = Partition::from_restricted_growth_with_gap(&[0, 0, 1]);
    assert!(ok);
    let (_, ok) = Partition::from_restricted_growth_with_gap(&[0, 1, 1, 2]);
    assert!(ok);
    let (_, ok) = Partition::from_restricted_growth_with_gap(&[0, 1, 0]);
    assert!(!ok);
    let (_, ok) = Partition::from_restricted_growth_with_gap(&[0, 1, 2, 0]);
    assert!(!ok);
}

#[test]
fn gap_decoding_splits_padding_from_modeled_blocks() {
    let (full, ok) = Partition::from_restricted_growth_with_gap(&[0, 0, 1, 2, 1]);
    assert!(ok);
    // Block zero holds the two excluded positions, the high bits.
    assert_eq!(full.as_slice()[0], 0b11000);
    let modeled = Partition::from_blocks(&full.as_slice()[1..]);
    assert_eq!(modeled.as_slice(), &[0b101, 0b010]);
    assert_eq!(modeled.check(), (true, 3));
}

#[test]
fn validator_reports_rank_and_disjointness() {
    assert_eq!(Partition::from_blocks(&[0b1111]).check(), (true, 4));
    assert_eq!(
        Partition::from_blocks(&[0b1000, 0b0110, 0b0001]).check(),
        (true, 4)
    );
    // A shared element is caught by the popcount comparison.
    assert_eq!(
        Partition::from_blocks(&[0b1100, 0b0110]).check(),
        (false, 4)
    );
    // The empty partition is trivially valid and covers nothing.
    assert_eq!(Partition::from_blocks(&[]).check(), (true, 0));
}
