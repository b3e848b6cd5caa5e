//! Precomputed interaction matrices against the direct Ewald evaluator.

use std::sync::Arc;

use approx::assert_relative_eq;
use madelung_compute::SerialBackend;
use madelung_core::matrix::{InteractionEntry, MatrixStorage};
use madelung_core::{
    build_interaction_matrix, contract_energy, ChargeSystem, DirectSummation, EnergyContractor,
    EwaldError, EwaldParameters, EwaldSummation, InteractionMatrixBuilder, LatticeSum,
    MatrixLayout, Multipole, SharedInteractionMatrix, SpinSystem,
};
use madelung_geometry::LatticeGeometry;
use nalgebra::Vector3;

/// Triclinic cell, two basis atoms, 2 x 2 x 1 supercell.
fn triclinic() -> Arc<LatticeGeometry> {
    Arc::new(
        LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.2, 1.1, 0.0], [0.1, -0.15, 0.95]],
            &[[0.0, 0.0, 0.0], [0.47, 0.61, 0.38]],
            [2, 2, 1],
        )
        .unwrap(),
    )
}

/// Deterministic, uneven per-site values.
fn pseudo_random(n: usize, seed: usize) -> Vec<f64> {
    (0..n)
        .map(|i| ((i * 137 + seed * 251 + 31) % 97) as f64 / 97.0 - 0.5)
        .collect()
}

fn charges(g: &Arc<LatticeGeometry>, seed: usize) -> ChargeSystem {
    ChargeSystem::new(Arc::clone(g), pseudo_random(g.n_sites(), seed)).unwrap()
}

fn moments(g: &Arc<LatticeGeometry>, seed: usize) -> SpinSystem {
    let v = pseudo_random(3 * g.n_sites(), seed);
    let m = v.chunks(3).map(|c| Vector3::new(c[0], c[1], c[2])).collect();
    SpinSystem::new(Arc::clone(g), m).unwrap()
}

fn params() -> EwaldParameters {
    EwaldParameters::uniform(2.5, 2, 6)
}

#[test]
fn test_monopole_contraction_matches_evaluator() {
    let g = triclinic();
    let ewald = EwaldSummation::new(params()).unwrap();
    for layout in [MatrixLayout::Dense, MatrixLayout::Compressed] {
        let matrix = build_interaction_matrix(Arc::clone(&g), &params(), layout, Multipole::Monopole)
            .unwrap();
        // Net charge is generally non-zero here, so the background term is exercised too.
        for seed in 0..4 {
            let system = charges(&g, seed);
            let direct = ewald.energy_monopole(&system).unwrap();
            let contracted = contract_energy(&system, &matrix).unwrap();
            eprintln!("{layout:>10} seed {seed}: {direct:.12} vs {contracted:.12}");
            assert_relative_eq!(contracted, direct, max_relative = 1e-10, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_dipole_tensor_path_matches_scalar_path() {
    // The evaluator uses the scalar (p_i.k)(p_j.k) reciprocal term and the
    // matrix stores the k k^T tensor; both share one damping constant.
    let g = triclinic();
    let ewald = EwaldSummation::new(params()).unwrap();
    for layout in [MatrixLayout::Dense, MatrixLayout::Compressed] {
        let matrix =
            build_interaction_matrix(Arc::clone(&g), &params(), layout, Multipole::Dipole).unwrap();
        for seed in 0..3 {
            let system = moments(&g, seed);
            let direct = ewald.energy_dipole(&system).unwrap();
            let contracted = contract_energy(&system, &matrix).unwrap();
            assert_relative_eq!(contracted, direct, max_relative = 1e-10, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_compressed_entries_are_bit_identical() {
    let g = triclinic();
    for kind in [Multipole::Monopole, Multipole::Dipole] {
        let dense = InteractionMatrixBuilder::with_backend(
            params(),
            MatrixLayout::Dense,
            Arc::new(SerialBackend),
        )
        .unwrap()
        .build(Arc::clone(&g), kind)
        .unwrap();
        let compressed = build_interaction_matrix(Arc::clone(&g), &params(), MatrixLayout::Compressed, kind)
            .unwrap();

        assert!(compressed.storage_len() < dense.storage_len());
        for i in 0..g.n_sites() {
            for j in 0..g.n_sites() {
                assert_eq!(compressed.entry(i, j), dense.entry(i, j), "pair ({i}, {j})");
            }
        }

        let (MatrixStorage::Dense(expanded), MatrixStorage::Dense(reference)) =
            (compressed.expand_to_dense().storage().clone(), dense.storage().clone())
        else {
            panic!("expand_to_dense must produce dense storage");
        };
        assert_eq!(expanded, reference);
    }
}

#[test]
fn test_self_and_neutrality_terms_are_baked_in() {
    let g = triclinic();
    let p = params();
    let matrix = build_interaction_matrix(Arc::clone(&g), &p, MatrixLayout::Compressed, Multipole::Monopole)
        .unwrap();
    // A single unit charge: U = A[0,0] must equal the full Ewald energy.
    let mut q = vec![0.0; g.n_sites()];
    q[0] = 1.0;
    let system = ChargeSystem::new(Arc::clone(&g), q).unwrap();
    let report = EwaldSummation::new(p).unwrap().evaluate_monopole(&system).unwrap();
    let InteractionEntry::Scalar(a00) = matrix.entry(0, 0) else {
        panic!("monopole entries are scalars");
    };
    assert!(report.self_energy < 0.0 && report.neutrality < 0.0);
    assert_relative_eq!(a00, report.total, max_relative = 1e-12);
}

#[test]
fn test_mismatched_configuration_is_rejected() {
    let g = triclinic();
    let mono = build_interaction_matrix(Arc::clone(&g), &params(), MatrixLayout::Dense, Multipole::Monopole)
        .unwrap();
    let compressed = build_interaction_matrix(
        Arc::clone(&g),
        &params(),
        MatrixLayout::Compressed,
        Multipole::Monopole,
    )
    .unwrap();

    // Wrong multipole kind.
    let err = contract_energy(&moments(&g, 0), &mono).unwrap_err();
    assert!(matches!(err, EwaldError::ConfigurationMismatch { what: "multipole kind", .. }));

    // Same site count, different supercell.
    let other = Arc::new(
        LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.2, 1.1, 0.0], [0.1, -0.15, 0.95]],
            &[[0.0, 0.0, 0.0], [0.47, 0.61, 0.38]],
            [4, 1, 1],
        )
        .unwrap(),
    );
    for matrix in [&mono, &compressed] {
        let err = contract_energy(&charges(&other, 1), matrix).unwrap_err();
        assert!(matches!(err, EwaldError::ConfigurationMismatch { what: "supercell", .. }));
    }

    // Different basis count.
    let one_atom = Arc::new(
        LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0.0, 0.0, 0.0]],
            [2, 2, 1],
        )
        .unwrap(),
    );
    let err = contract_energy(&charges(&one_atom, 2), &compressed).unwrap_err();
    assert!(matches!(err, EwaldError::ConfigurationMismatch { what: "basis atoms", .. }));
}

#[test]
fn test_lattice_sum_methods_agree() {
    let g = Arc::new(
        LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
            [1, 1, 1],
        )
        .unwrap(),
    );
    let system = ChargeSystem::per_basis(Arc::clone(&g), &[1.0, -1.0]).unwrap();
    let p = EwaldParameters::uniform(3.0, 2, 6);

    let methods: Vec<Box<dyn LatticeSum>> = vec![
        Box::new(EwaldSummation::new(p.clone()).unwrap()),
        Box::new(
            build_interaction_matrix(Arc::clone(&g), &p, MatrixLayout::Dense, Multipole::Monopole)
                .unwrap(),
        ),
        Box::new(
            build_interaction_matrix(Arc::clone(&g), &p, MatrixLayout::Compressed, Multipole::Monopole)
                .unwrap(),
        ),
    ];
    let reference = methods[0].monopole_energy(&system).unwrap();
    for method in &methods {
        let e = method.monopole_energy(&system).unwrap();
        eprintln!("{:<32} {e:.12}", method.method_name());
        assert_relative_eq!(e, reference, max_relative = 1e-10);
    }

    // The damped direct sum is only close at finite damping.
    let direct = DirectSummation::new(0.01, 60.0).unwrap();
    let e = direct.monopole_energy(&system).unwrap();
    assert!((e - reference).abs() < 0.01, "{}: {e}", direct.method_name());
}

#[test]
fn test_shared_matrix_swap_on_publish() {
    let g = triclinic();
    let system = charges(&g, 5);
    let first = build_interaction_matrix(Arc::clone(&g), &params(), MatrixLayout::Compressed, Multipole::Monopole)
        .unwrap();
    let shared = SharedInteractionMatrix::new(first);
    let contractor = EnergyContractor::default();

    let before = shared.snapshot();
    let e_before = shared.contract(&contractor, &system).unwrap();

    // Rebuilding with a coarser real-space sum changes the energy slightly.
    let coarse = InteractionMatrixBuilder::new(
        EwaldParameters::uniform(0.8, 1, 2),
        MatrixLayout::Dense,
    )
    .unwrap();
    let published = shared.rebuild(&coarse, Arc::clone(&g), Multipole::Monopole).unwrap();
    assert_eq!(published.layout(), MatrixLayout::Dense);
    assert!(Arc::ptr_eq(&published, &shared.snapshot()));

    // The old snapshot is still alive and unchanged.
    assert_eq!(before.layout(), MatrixLayout::Compressed);
    assert_relative_eq!(contractor.contract(&before, &system).unwrap(), e_before, max_relative = 1e-14);
    let e_after = shared.contract(&contractor, &system).unwrap();
    assert!((e_after - e_before).abs() > 1e-9);

    // Concurrent readers while a writer republishes.
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..8 {
                    let e = shared.contract(&contractor, &system).unwrap();
                    assert!(e.is_finite());
                }
            });
        }
        scope.spawn(|| {
            let m = build_interaction_matrix(
                Arc::clone(&g),
                &params(),
                MatrixLayout::Compressed,
                Multipole::Monopole,
            )
            .unwrap();
            shared.publish(m);
        });
    });
    let e_final = shared.contract(&contractor, &system).unwrap();
    assert_relative_eq!(e_final, e_before, max_relative = 1e-12);
}
