use proptest::prelude::*;

use dgadapt::basis::alpert::AlpertBasis;
use dgadapt::config::AdaptConfig;
use dgadapt::errors::DGError;
use dgadapt::grids::dg_adapt::DGAdapt;
use dgadapt::refinement::user_defined::UserDefinedIndicator;
use dgadapt::storage::element::{Element, ElementKey};
use dgadapt::utilities::multi_index::{all_ancestor_indices, num_all_chd};

const NMAX: u8 = 4;

#[derive(Clone, Debug)]
enum Op
{
    Add(ElementKey),
    Delete(ElementKey),
    Refine,
    Coarsen,
}

fn key_strategy() -> impl Strategy<Value = ElementKey>
{
    (0..=NMAX, 0..=NMAX, any::<u32>(), any::<u32>()).prop_map(|(l0, l1, r0, r1)|
    {
        let index = |l: u8, r: u32| if l == 0 { 0 } else { 2 * (r % (1 << (l - 1))) + 1 };
        ElementKey::new(&[l0, l1], &[index(l0, r0), index(l1, r1)])
    })
}

fn op_strategy() -> impl Strategy<Value = Op>
{
    prop_oneof![
        3 => key_strategy().prop_map(Op::Add),
        3 => key_strategy().prop_map(Op::Delete),
        1 => Just(Op::Refine),
        1 => Just(Op::Coarsen),
    ]
}

/// Pseudo-random but fixed indicator per element.
fn scrambled(_: &[f64], element: &Element) -> f64
{
    (element.id().wrapping_mul(2654435761) % 1000) as f64 / 1000.0
}

fn grid(sparse: bool) -> DGAdapt<AlpertBasis>
{
    let config = AdaptConfig::new(2, 1, NMAX, 0.5, 0.2).with_sparse(sparse);
    let mut grid = DGAdapt::new(config, AlpertBasis::new(0)).unwrap();
    grid.set_indicator(UserDefinedIndicator::new(scrambled));
    grid
}

fn assert_consistent(grid: &DGAdapt<AlpertBasis>)
{
    grid.check_hole().unwrap();
    grid.check_total_num_chd_par_equal().unwrap();
    grid.store().check_consistency().unwrap();
    let constraint = grid.config().constraint();
    for element in grid.elements()
    {
        for ancestor in all_ancestor_indices(element.key())
        {
            assert!(grid.contains(&ancestor), "{} lacks ancestor {ancestor}", element.key());
        }
        let is_leaf = element.num_exist_chd() < num_all_chd(element.level(), &constraint);
        assert_eq!(grid.leaf().contains(&element.id()), is_leaf);
        assert_eq!(grid.leaf_zero_child().contains(&element.id()), is_leaf && element.num_exist_chd() == 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operations_never_leave_holes(sparse in any::<bool>(), ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut grid = grid(sparse);
        let constraint = grid.config().constraint();
        for op in ops {
            match op {
                Op::Add(key) => {
                    let admitted = constraint.admits(&key.level);
                    match grid.add_elem(&key) {
                        Ok(_) => {
                            prop_assert!(admitted);
                            let len = grid.len();
                            prop_assert_eq!(grid.add_elem(&key), Ok(false));
                            prop_assert_eq!(grid.len(), len);
                        }
                        Err(e) => {
                            prop_assert!(!admitted);
                            prop_assert!(matches!(e, DGError::InvalidIndex { .. }), "unexpected {:?}", e);
                        }
                    }
                }
                Op::Delete(key) => {
                    let before = grid.len();
                    let had_children = grid.find(&key).map(|e| e.num_exist_chd() > 0);
                    match grid.del_elem(&key) {
                        Ok(true) => { prop_assert_eq!(grid.len(), before - 1); }
                        Ok(false) => { prop_assert!(had_children.is_none()); }
                        Err(e) => {
                            prop_assert_eq!(had_children, Some(true));
                            prop_assert_eq!(e, DGError::ElementHasChildren { key: key.clone() });
                            prop_assert_eq!(grid.len(), before);
                        }
                    }
                }
                Op::Refine => {
                    let before = grid.len();
                    let added = grid.refine().unwrap();
                    prop_assert_eq!(grid.len(), before + added);
                }
                Op::Coarsen => {
                    let before = grid.len();
                    let removed = grid.coarsen().unwrap();
                    prop_assert_eq!(grid.len(), before - removed);
                    for element in grid.elements() {
                        let childless = element.num_exist_chd() == 0;
                        prop_assert!(!childless || grid.is_initial(element.key()) || scrambled(&[], element) >= 0.2);
                    }
                }
            }
            assert_consistent(&grid);
        }
    }

    #[test]
    fn ids_round_trip(key in key_strategy()) {
        let grid = grid(false);
        let id = grid.store().hash().hash_key(&key);
        prop_assert_eq!(grid.store().hash().decode(id), key);
    }
}
