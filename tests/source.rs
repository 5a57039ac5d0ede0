use cvtree_signature::*;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

const FASTA: &[u8] = b">p1 first protein\nMKVL\nATG\n>p2 tiny\nWY\n>p3\nGGGGAG\n";

fn write_fasta(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(body).unwrap();
    path
}

#[test]
fn records_strip_line_breaks() {
    let source = FastaSource::from_reader(Cursor::new(FASTA.to_vec()), 3).unwrap();
    let records: Vec<Record> = source.map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].id, "p1 first protein");
    assert_eq!(records[0].seq, b"MKVLATG".to_vec());
    assert_eq!(records[1].seq, b"WY".to_vec());
}

#[test]
fn events_seed_each_record() {
    let source = FastaSource::from_reader(Cursor::new(FASTA.to_vec()), 3).unwrap();
    let events: Vec<SequenceEvent> = source.events().map(|e| e.unwrap()).collect();
    let mut want = vec![SequenceEvent::RecordStart(b"MK".to_vec())];
    want.extend(b"VLATG".iter().map(|&b| SequenceEvent::Residue(b)));
    want.push(SequenceEvent::RecordStart(b"WY".to_vec()));
    want.push(SequenceEvent::RecordStart(b"GG".to_vec()));
    want.extend(b"GGAG".iter().map(|&b| SequenceEvent::Residue(b)));
    assert_eq!(events, want);
}

#[test]
fn short_record_event_carries_what_exists() {
    let source = FastaSource::from_reader(Cursor::new(FASTA.to_vec()), 6).unwrap();
    let starts: Vec<Vec<u8>> = source
        .events()
        .filter_map(|e| match e.unwrap() {
            SequenceEvent::RecordStart(seed) => Some(seed),
            SequenceEvent::Residue(_) => None,
        })
        .collect();
    assert_eq!(starts, vec![b"MKVLA".to_vec(), b"WY".to_vec(), b"GGGGA".to_vec()]);
}

#[test]
fn event_and_record_paths_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fasta(dir.path(), "g.faa", FASTA);
    let cfg = BuildConfig::default().window(3);

    let from_path = build_signature_from_path(&cfg, &path).unwrap();
    let source = FastaSource::from_path(&path, 3).unwrap();
    let from_events = build_signature(&cfg, source.events()).unwrap();

    assert_eq!(from_path.signature, from_events.signature);
    assert!(from_path.record_errors.is_empty());
    assert_eq!(from_path.signature.record_count(), 3);
    assert_eq!(from_path.signature.total_residues(), 15);
}

#[test]
fn event_and_record_paths_agree_for_every_policy() {
    let dir = tempfile::tempdir().unwrap();
    let body = b">a\nMKJVLATGQ\n>b\nMKVLAT\n>c\nWY\n>d\nGG*GGAGQ\n>e\nJMKVL\n";
    let path = write_fasta(dir.path(), "g.faa", body);
    for policy in [InvalidResidue::Reseed, InvalidResidue::Elide, InvalidResidue::Reject] {
        for min_len in [0, 7] {
            let cfg = BuildConfig::default()
                .window(3)
                .invalid_residues(policy)
                .min_record_len(min_len);
            let from_path = build_signature_from_path(&cfg, &path).unwrap();
            let source = FastaSource::from_path(&path, 3).unwrap();
            let from_events = build_signature(&cfg, source.events()).unwrap();
            assert_eq!(
                from_path.signature, from_events.signature,
                "{policy:?}, min_record_len {min_len}"
            );
            assert_eq!(from_path.record_errors.len(), from_events.record_errors.len());
        }
    }
}

#[test]
fn short_records_reported_per_genome() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fasta(dir.path(), "g.faa", FASTA);
    let cfg = BuildConfig::default();
    let report = build_signature_from_path(&cfg, &path).unwrap();
    assert_eq!(report.record_errors.len(), 1);
    assert!(matches!(
        report.record_errors[0],
        SignatureError::RecordTooShort { record: 1, len: 2, need: 5 }
    ));
    assert_eq!(report.signature.record_count(), 2);
}

#[test]
fn unreadable_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = BuildConfig::default().window(3);
    assert!(build_signature_from_path(&cfg, &dir.path().join("missing.faa")).is_err());
    assert!(FastaSource::from_reader(Cursor::new(Vec::new()), 3).is_err());
}

#[test]
fn batch_isolates_failures_and_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let a = write_fasta(dir.path(), "a.faa", b">a\nMKVLATGQWMKVLPPEEHH\n>b\nWYHHEMKV\n");
    let b = write_fasta(dir.path(), "b.faa", b">x\nGGGGAGGGGMKVLAT\n");
    let missing = dir.path().join("nope.faa");
    let cfg = BuildConfig::default().window(3).threads(2).cache_dir(&cache);

    let paths = vec![a.clone(), missing, b.clone()];
    let first = build_vectors(&cfg, &paths).unwrap();
    assert!(first[0].is_ok());
    assert!(first[1].is_err());
    assert!(first[2].is_ok());

    let cached = cfg.cache_path(&a).unwrap();
    assert!(cached.exists());
    assert_eq!(&read_vector(&cached).unwrap(), first[0].as_ref().unwrap());

    let second = build_vectors(&cfg, &[a, b]).unwrap();
    assert_eq!(second[0].as_ref().unwrap(), first[0].as_ref().unwrap());
    assert_eq!(second[1].as_ref().unwrap(), first[2].as_ref().unwrap());

    let vectors: Vec<CompositionVector> = second.into_iter().map(|r| r.unwrap()).collect();
    let m = distance_matrix(&vectors).unwrap();
    assert!(m.get(0, 1) > 0.0);
}

#[test]
fn cache_is_keyed_by_settings() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let g = write_fasta(dir.path(), "g.faa", b">b\nMKVJLATWWY\n>c\nGGGGAGGGGMKVLAT\n");
    let reseed = BuildConfig::default().window(3).cache_dir(&cache);
    let reject = reseed.clone().invalid_residues(InvalidResidue::Reject);
    let longer = reseed.clone().min_record_len(12);

    let fresh = |cfg: &BuildConfig| {
        let report = build_signature_from_path(cfg, &g).unwrap();
        CompositionVector::build(&report.signature, cfg.background_model())
    };

    let rejected = build_vectors(&reject, &[&g]).unwrap().remove(0).unwrap();
    assert_eq!(rejected, fresh(&reject));
    let reseeded = build_vectors(&reseed, &[&g]).unwrap().remove(0).unwrap();
    assert_eq!(reseeded, fresh(&reseed));
    assert_ne!(reseeded, rejected);
    let trimmed = build_vectors(&longer, &[&g]).unwrap().remove(0).unwrap();
    assert_eq!(trimmed, fresh(&longer));

    let paths = [&reseed, &reject, &longer].map(|c| c.cache_path(&g).unwrap());
    assert_ne!(paths[0], paths[1]);
    assert_ne!(paths[0], paths[2]);
    // a second pass is served from the matching entries
    assert_eq!(build_vector_from_path(&reject, &g).unwrap(), rejected);
    let (_, stamp) = read_stamped_vector(&paths[1]).unwrap();
    assert_eq!(stamp, reject.provenance(&g).unwrap());
}

#[test]
fn cache_tells_same_named_genomes_apart() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    std::fs::create_dir_all(dir.path().join("x")).unwrap();
    std::fs::create_dir_all(dir.path().join("y")).unwrap();
    let a = write_fasta(&dir.path().join("x"), "g.faa", b">a\nMKVLATGQWMKVLPPEEHH\n");
    let b = write_fasta(&dir.path().join("y"), "g.faa", b">b\nGGGGAGGGGPPPPRRRRSSSS\n");
    let cfg = BuildConfig::default().window(3).cache_dir(&cache);

    assert_ne!(cfg.cache_path(&a), cfg.cache_path(&b));
    let both = build_vectors(&cfg, &[&a, &b]).unwrap();
    let va = both[0].as_ref().unwrap();
    let vb = both[1].as_ref().unwrap();
    assert_ne!(va, vb);

    let again = build_vectors(&cfg, &[&b]).unwrap().remove(0).unwrap();
    assert_eq!(&again, vb);
    let entries = std::fs::read_dir(&cache).unwrap().count();
    assert_eq!(entries, 2);
}

#[test]
fn cache_follows_edits_to_the_genome() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let g = write_fasta(dir.path(), "g.faa", b">a\nMKVLATGQWMKVLPPEEHH\n");
    let cfg = BuildConfig::default().window(3).cache_dir(&cache);
    let before = build_vector_from_path(&cfg, &g).unwrap();

    write_fasta(dir.path(), "g.faa", b">a\nGGGGAGGGGPPPPRRRRSSSSWWYY\n");
    let after = build_vector_from_path(&cfg, &g).unwrap();
    assert_ne!(before, after);
    let report = build_signature_from_path(&cfg, &g).unwrap();
    assert_eq!(after, CompositionVector::build(&report.signature, cfg.background_model()));
}

#[test]
fn single_genome_build_creates_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("nested").join("cache");
    let g = write_fasta(dir.path(), "g.faa", b">a\nMKVLATGQWMKVLPPEEHH\n");
    let cfg = BuildConfig::default().window(3).cache_dir(&cache);

    let v = build_vector_from_path(&cfg, &g).unwrap();
    let cached = cfg.cache_path(&g).unwrap();
    assert!(cached.exists());
    assert_eq!(read_vector(&cached).unwrap(), v);
}
