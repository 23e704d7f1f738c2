//! Property tests for the SPSC ring: for any interleaving of writes and
//! reads, read bytes form a prefix of written bytes and the size word
//! accounts exactly for the difference.

use oriel_audio::ring;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..48).prop_map(Op::Write),
        (0usize..48).prop_map(Op::Read),
    ]
}

proptest! {
    #[test]
    fn reads_are_a_prefix_of_writes(
        capacity in 1usize..64,
        ops in prop::collection::vec(op_strategy(), 1..64),
    ) {
        let (mut tx, mut rx) = ring(capacity);
        let mut written = Vec::new();
        let mut read_back = Vec::new();
        let mut scratch = vec![0u8; 64];

        for op in &ops {
            match op {
                Op::Write(data) => {
                    let accepted = tx.write(data);
                    prop_assert!(accepted <= data.len());
                    written.extend_from_slice(&data[..accepted]);
                }
                Op::Read(want) => {
                    let got = rx.read(&mut scratch[..*want]);
                    prop_assert!(got <= *want);
                    read_back.extend_from_slice(&scratch[..got]);
                }
            }

            // W − R == size, 0 ≤ size ≤ capacity, at every observation
            let size = tx.len();
            prop_assert_eq!(written.len() - read_back.len(), size);
            prop_assert!(size <= capacity);
        }

        // FIFO: everything read so far is a prefix of everything accepted
        prop_assert_eq!(&written[..read_back.len()], &read_back[..]);

        // Drain and check the remainder matches too
        let mut rest = vec![0u8; capacity];
        let got = rx.read(&mut rest);
        read_back.extend_from_slice(&rest[..got]);
        prop_assert_eq!(&written[..], &read_back[..]);
    }

    #[test]
    fn short_write_keeps_accepted_prefix(capacity in 1usize..32, data in prop::collection::vec(any::<u8>(), 0..96)) {
        let (mut tx, mut rx) = ring(capacity);
        let accepted = tx.write(&data);
        prop_assert_eq!(accepted, data.len().min(capacity));

        let mut out = vec![0u8; capacity];
        let got = rx.read(&mut out);
        prop_assert_eq!(got, accepted);
        prop_assert_eq!(&out[..got], &data[..accepted]);
    }
}
