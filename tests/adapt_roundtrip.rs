use forest_amr::prelude::*;
use itertools::Itertools;

fn serial_root2d() -> Forest<2> {
    let ctx = ForestContext::new(1).unwrap();
    Forest::root(&ctx, &NoComm)
}

#[test]
fn refine_root_once_gives_four_keep_children() {
    let mut f = serial_root2d();
    f.set_flags(&[RefineFlag::Refine]).unwrap();
    let fine = f.refine(&NoComm);
    assert_eq!(fine.local_num(), 4);
    assert_eq!(fine.global_num(), 4);
    assert!(fine.flags().iter().all(|&fl| fl == RefineFlag::Keep));
    assert!(fine.octants().iter().all(|o| o.level == 1));
}

#[test]
fn refining_one_of_four_children_gives_seven() {
    let mut f = serial_root2d();
    f.set_flags(&[RefineFlag::Refine]).unwrap();
    let mut fine = f.refine(&NoComm);
    fine.set_flags(&[
        RefineFlag::Refine,
        RefineFlag::Keep,
        RefineFlag::Keep,
        RefineFlag::Keep,
    ])
    .unwrap();
    let finer = fine.refine(&NoComm);
    assert_eq!(finer.local_num(), 7);
}

#[test]
fn forests_stay_strictly_morton_sorted() {
    let mut f = serial_root2d();
    f.set_flags(&[RefineFlag::Refine]).unwrap();
    let mut f = f.refine(&NoComm);
    for tag_at in [0usize, 2, 3] {
        f.set_flag(tag_at, RefineFlag::Refine);
        f = f.refine(&NoComm);
        assert!(
            f.octants()
                .iter()
                .tuple_windows()
                .all(|(a, b)| a.cmp_morton(b).is_lt())
        );
    }
}

#[test]
fn refine_coarsen_roundtrip_restores_sequence() {
    let mut f = serial_root2d();
    f.set_flags(&[RefineFlag::Refine]).unwrap();
    let mut fine = f.refine(&NoComm);
    fine.set_flag(3, RefineFlag::Refine);
    let finer = fine.refine(&NoComm);
    assert_eq!(finer.local_num(), 7);

    // Coarsen the deep family back, then the remaining one.
    let mut back = finer.clone();
    let flags: Vec<_> = back
        .octants()
        .iter()
        .map(|o| if o.level == 2 { RefineFlag::Coarsen } else { RefineFlag::Keep })
        .collect();
    back.set_flags(&flags).unwrap();
    let back = back.coarsen(&NoComm);
    assert_eq!(back.octants(), fine.octants());

    let mut back = back;
    back.set_flags(&[RefineFlag::Coarsen; 4]).unwrap();
    let root_again = back.coarsen(&NoComm);
    assert_eq!(root_again.octants(), f.octants());
    assert_eq!(root_again.global_num(), 1);
}

#[test]
fn copy_is_deep_and_independent() {
    let mut f = serial_root2d();
    f.set_flags(&[RefineFlag::Refine]).unwrap();
    let fine = f.refine(&NoComm);
    let mut copy = fine.clone();
    copy.set_flag(1, RefineFlag::Coarsen);
    assert_eq!(fine.flags()[1], RefineFlag::Keep);
    assert_eq!(copy.octants(), fine.octants());
}

#[test]
fn reconcile_reports_mixed_outcomes() {
    let mut f = serial_root2d();
    f.set_flags(&[RefineFlag::Refine]).unwrap();
    let mut fine = f.refine(&NoComm);

    // Refine child 1, leave the rest.
    fine.set_flag(1, RefineFlag::Refine);
    let step = fine.refine(&NoComm);
    let flags = reconcile_flags(&fine, &step).unwrap();
    assert_eq!(
        flags,
        vec![RefineFlag::Keep, RefineFlag::Refine, RefineFlag::Keep, RefineFlag::Keep]
    );

    // And the reverse direction reports coarsening of the family.
    let mut fine_tagged = step.clone();
    let coarsen_flags: Vec<_> = fine_tagged
        .octants()
        .iter()
        .map(|o| if o.level == 2 { RefineFlag::Coarsen } else { RefineFlag::Keep })
        .collect();
    fine_tagged.set_flags(&coarsen_flags).unwrap();
    let merged = fine_tagged.coarsen(&NoComm);
    let outcome = reconcile_flags(&step, &merged).unwrap();
    let coarsened = outcome.iter().filter(|&&fl| fl == RefineFlag::Coarsen).count();
    assert_eq!(coarsened, 4);
}
