use cvtree_signature::*;
use proptest::prelude::*;

/// Direct base-20 encoding of `codes`, most significant first.
fn positional(codes: &[u8]) -> u64 {
    codes.iter().fold(0u64, |acc, &c| acc * 20 + c as u64)
}

fn residues(min: usize, max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(ALPHABET.to_vec()), min..max)
}

/// Naive count: every window of every record, recomputed from scratch.
fn naive_kmer_counts(k: usize, records: &[Vec<u8>]) -> Vec<u64> {
    let mut counts = vec![0u64; 20usize.pow(k as u32)];
    for rec in records {
        for w in rec.windows(k) {
            counts[encode_window(w).unwrap() as usize] += 1;
        }
    }
    counts
}

proptest! {
    #[test]
    fn prop_extend_matches_positional(
        k in 2usize..=7,
        codes in prop::collection::vec(0u8..20, 7..40),
    ) {
        let radix = Radix::new(k).unwrap();
        let mut rolling = radix.reset(&codes[..k - 1]).unwrap();
        prop_assert_eq!(rolling, positional(&codes[..k - 1]));
        for end in k..=codes.len() {
            let (kmer, next) = radix.extend(rolling, codes[end - 1]);
            prop_assert_eq!(kmer, positional(&codes[end - k..end]));
            prop_assert_eq!(next, positional(&codes[end - k + 1..end]));
            prop_assert!(kmer < radix.m());
            prop_assert!(next < radix.m1());
            prop_assert_eq!(radix.prefix(kmer), rolling);
            prop_assert_eq!(radix.suffix(kmer), next);
            rolling = next;
        }
    }

    #[test]
    fn prop_counts_match_naive_scan(
        k in 2usize..=4,
        records in prop::collection::vec(residues(4, 60), 1..6),
    ) {
        let mut acc = Accumulator::new(Radix::new(k).unwrap(), InvalidResidue::Reseed);
        for rec in &records {
            acc.push_record(rec).unwrap();
        }
        let sig = acc.finish();
        let n_records = records.len() as u64;
        let n_residues: u64 = records.iter().map(|r| r.len() as u64).sum();

        prop_assert_eq!(sig.kmer_counts(), &naive_kmer_counts(k, &records)[..]);
        prop_assert_eq!(sig.total_residues(), n_residues);
        prop_assert_eq!(sig.record_count(), n_records);
        prop_assert_eq!(sig.total_kmers(), n_residues - n_records * (k as u64 - 1));
        prop_assert_eq!(sig.kmer_counts().iter().sum::<u64>(), sig.total_kmers());
        prop_assert_eq!(sig.kmer1_counts().iter().sum::<u64>(), sig.total_kmer1());
        prop_assert!(sig.rolling_index() < sig.radix().m1());
    }

    #[test]
    fn prop_elide_ignores_invalid_symbols(
        k in 2usize..=4,
        rec in residues(8, 80),
        junk in prop::collection::vec((any::<prop::sample::Index>(), prop::sample::select(b"JO*-1#j".to_vec())), 1..4),
    ) {
        let mut dirty = rec.clone();
        for (at, b) in &junk {
            let pos = at.index(dirty.len() + 1);
            dirty.insert(pos, *b);
        }
        let radix = Radix::new(k).unwrap();
        let mut a = Accumulator::new(radix, InvalidResidue::Elide);
        let mut b = Accumulator::new(radix, InvalidResidue::Elide);
        a.push_record(&dirty).unwrap();
        b.push_record(&rec).unwrap();
        let (a, b) = (a.finish(), b.finish());
        prop_assert_eq!(a.kmer_counts(), b.kmer_counts());
        prop_assert_eq!(a.kmer1_counts(), b.kmer1_counts());
        prop_assert_eq!(a.residue_counts(), b.residue_counts());
        prop_assert_eq!(a.invalid_residues(), junk.len() as u64);
    }

    #[test]
    fn prop_distance_identity_and_symmetry(
        left in prop::collection::vec(residues(5, 120), 1..4),
        right in prop::collection::vec(residues(5, 120), 1..4),
        markov in any::<bool>(),
    ) {
        let bg = if markov { Background::Markov } else { Background::Blended };
        let cfg = BuildConfig::default().window(3).background(bg);
        let vector = |records: &[Vec<u8>]| {
            let events = records.iter().flat_map(|r| {
                std::iter::once(SequenceEvent::RecordStart(r[..2].to_vec()))
                    .chain(r[2..].iter().map(|&b| SequenceEvent::Residue(b)))
            });
            let report = build_signature(&cfg, events.map(Ok)).unwrap();
            CompositionVector::build(&report.signature, bg)
        };
        let (a, b) = (vector(&left[..]), vector(&right[..]));

        prop_assert!(a.components().iter().all(|c| c.value.is_finite()));
        prop_assert_eq!(distance(&a, &a).unwrap(), 0.0);
        prop_assert_eq!(distance(&b, &b).unwrap(), 0.0);
        let ab = distance(&a, &b).unwrap();
        prop_assert_eq!(ab, distance(&b, &a).unwrap());
        prop_assert!((0.0..=1.0).contains(&ab));
    }
}
