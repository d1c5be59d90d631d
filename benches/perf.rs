use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use tui_treegrid::{
    NodeData, Tree, TreeGridState, TreeRegistry, VisitAction, VisitRowsOptions, visit_rows,
};

/// Builds `top` folders with `width` children each, every folder expanded.
fn build_data(top: usize, width: usize) -> Vec<NodeData> {
    (0..top)
        .map(|i| {
            NodeData::new(format!("folder {i}"))
                .expanded(true)
                .children((0..width).map(|j| {
                    NodeData::new(format!("item {i}.{j}")).cell("size", format!("{j}"))
                }))
        })
        .collect()
}

fn build_tree(top: usize, width: usize) -> Tree {
    let mut tree = Tree::new(&mut TreeRegistry::new());
    let root = tree.root();
    tree.add_children(root, &build_data(top, width))
        .expect("unique generated keys");
    tree
}

fn bench_visit_rows(c: &mut Criterion) {
    let tree = build_tree(1_000, 100);
    c.bench_function("visit_rows/100k", |b| {
        b.iter(|| {
            let mut count = 0usize;
            visit_rows(black_box(&tree), &VisitRowsOptions::new(), |_, _| {
                count += 1;
                VisitAction::Continue
            })
            .expect("valid tree");
            black_box(count)
        });
    });

    let start = tree.find_key("_50000").expect("generated key");
    c.bench_function("visit_rows/reverse_page", |b| {
        b.iter(|| {
            let mut remaining = 40;
            let options = VisitRowsOptions::new().start(start).reverse(true);
            visit_rows(black_box(&tree), &options, |_, _| {
                remaining -= 1;
                if remaining == 0 {
                    VisitAction::Stop
                } else {
                    VisitAction::Continue
                }
            })
            .expect("valid tree")
        });
    });
}

fn bench_viewport(c: &mut Criterion) {
    let mut state = TreeGridState::new(&mut TreeRegistry::new(), ());
    let root = state.tree().root();
    state
        .add_children(root, &build_data(1_000, 100))
        .expect("unique generated keys");
    state.set_viewport_size(800, 600);
    state.flush().expect("valid tree");

    let mut scroll_top = 0u64;
    c.bench_function("viewport/scroll_pass", |b| {
        b.iter(|| {
            scroll_top = (scroll_top + 220) % 2_000_000;
            state.set_scroll_top(scroll_top);
            black_box(state.flush().expect("valid tree"))
        });
    });
}

fn bench_bulk_insert(c: &mut Criterion) {
    c.bench_function("state/suspended_bulk_insert", |b| {
        b.iter(|| {
            let mut state = TreeGridState::new(&mut TreeRegistry::new(), ());
            let root = state.tree().root();
            state.run_without_update(|state| {
                for i in 0..1_000 {
                    state
                        .add_node(root, NodeData::new(format!("n{i}")), Default::default())
                        .expect("generated keys");
                }
            });
            black_box(state.update_count())
        });
    });
}

criterion_group!(benches, bench_visit_rows, bench_viewport, bench_bulk_insert);
criterion_main!(benches);
