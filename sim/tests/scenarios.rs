use granite_sim::{SimConfig, Simulation};

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Seven identical inputs: every participant observes a strong quorum on the
/// head before the quality timeout and decides the full chain in round 0.
#[test]
fn test_unanimous_quality() {
    init_logs();
    let mut sim = Simulation::new(SimConfig {
        honest_count: 7,
        ..SimConfig::default()
    });
    let chain = sim.base_chain().extend(&[b"s1".to_vec()]).unwrap();
    sim.receive_chains(&[(7, chain.clone())]).unwrap();

    let ok = sim.run(30.0).unwrap();
    assert!(ok, "not all participants decided:\n{}", sim.describe());

    for participant in 0..7 {
        let (value, round) = sim.finalized(participant).unwrap();
        assert_eq!(value, chain, "participant {} decided another chain", participant);
        assert_eq!(round, 0);
    }
}

/// A 4/3 split: neither fork reaches a strong quorum, so the quality timeout
/// narrows every proposal to the common base and the base is decided.
#[test]
fn test_split_quality_decides_base() {
    init_logs();
    let mut sim = Simulation::new(SimConfig {
        honest_count: 7,
        ..SimConfig::default()
    });
    let base = sim.base_chain();
    let a = base.extend(&[b"fork-a".to_vec()]).unwrap();
    let b = base.extend(&[b"fork-b".to_vec()]).unwrap();
    sim.receive_chains(&[(4, a), (3, b)]).unwrap();

    let ok = sim.run(30.0).unwrap();
    assert!(ok, "not all participants decided:\n{}", sim.describe());

    for participant in 0..7 {
        let (value, round) = sim.finalized(participant).unwrap();
        assert_eq!(value, base, "participant {} decided another chain", participant);
        assert_eq!(round, 0);
    }
}

/// An adversary with 30% of the power backs fork A through QUALITY and
/// PREPARE, then reveals its COMMIT to a single victim. That victim decides
/// A in round 0; the others miss the COMMIT quorum, sway to A through the
/// post-timeout COMMIT branch (the B side riding on the PREPARE
/// justifications cached from the victims' COMMITs), and decide A in
/// round 1. Agreement holds for every honest participant.
#[test]
fn test_withheld_commits_sway_all_to_adversary_fork() {
    init_logs();
    let mut sim = Simulation::new(SimConfig {
        honest_count: 7,
        ..SimConfig::default()
    });
    let base = sim.base_chain();
    let a = base.extend(&[b"fork-a".to_vec()]).unwrap();
    let b = base.extend(&[b"fork-b".to_vec()]).unwrap();

    // Adversary holds 3 of 10 total power; participants 0..4 prefer A and
    // are its victims.
    sim.set_adversary(99, 3, vec![0, 1, 2, 3], a.clone());
    sim.receive_chains(&[(4, a.clone()), (3, b)]).unwrap();

    // The B side's external chain keeps growing on top of fork A, so A stays
    // acceptable to them in later rounds.
    let a_extended = a.extend(&[b"a2".to_vec()]).unwrap();
    for participant in 4..7 {
        sim.receive_acceptable(participant, a_extended.clone());
    }

    let ok = sim.run(30.0).unwrap();
    assert!(ok, "not all participants decided:\n{}", sim.describe());

    // The adversary convinced one victim to decide A in round 0, so
    // agreement forces every honest participant onto A.
    let (value, round) = sim.finalized(0).unwrap();
    assert_eq!(value.head(), a.head());
    assert_eq!(round, 0);
    for participant in 1..7 {
        let (value, round) = sim.finalized(participant).unwrap();
        assert_eq!(
            value.head(),
            a.head(),
            "participant {} decided another head",
            participant
        );
        assert_eq!(round, 1, "participant {} decided in another round", participant);
    }
}

/// Agreement invariant: whatever the split, all honest participants that
/// terminate report the same head.
#[test]
fn test_agreement_across_uneven_splits() {
    init_logs();
    for (left, right) in [(6, 1), (5, 2), (4, 3)] {
        let mut sim = Simulation::new(SimConfig {
            honest_count: 7,
            ..SimConfig::default()
        });
        let base = sim.base_chain();
        let a = base.extend(&[b"fork-a".to_vec()]).unwrap();
        let b = base.extend(&[b"fork-b".to_vec()]).unwrap();
        sim.receive_chains(&[(left, a), (right, b)]).unwrap();

        let ok = sim.run(60.0).unwrap();
        assert!(ok, "split {}/{} did not decide:\n{}", left, right, sim.describe());

        let (first, _) = sim.finalized(0).unwrap();
        for participant in 1..7 {
            let (value, _) = sim.finalized(participant).unwrap();
            assert_eq!(
                value.head_cid_or_zero(),
                first.head_cid_or_zero(),
                "participants disagree in split {}/{}",
                left,
                right
            );
        }
    }
}
