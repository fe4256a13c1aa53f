use bramble_expr::flags::FENCE;
use bramble_expr::{backbone, live_nodes, Node, Op};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Shape {
    Leaf(u8),
    Pair(u8, Box<Shape>, Box<Shape>),
}

#[derive(Clone, Debug)]
enum Step {
    Share(usize),
    Release(usize),
    Isolate(usize),
    Graft(usize, usize),
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = (0u8..6).prop_map(Shape::Leaf);
    leaf.prop_recursive(6, 64, 2, |inner| {
        (0u8..3, inner.clone(), inner).prop_map(|(o, l, r)| Shape::Pair(o, Box::new(l), Box::new(r)))
    })
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<usize>().prop_map(Step::Share),
        any::<usize>().prop_map(Step::Release),
        any::<usize>().prop_map(Step::Isolate),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Graft(a, b)),
    ]
}

fn build(s: &Shape) -> Node {
    match s {
        Shape::Leaf(c) => Node::atom(&[b'a' + c]),
        Shape::Pair(o, l, r) => {
            let op = [Op::White, Op::Plus, Op::Times][*o as usize];
            Node::binary(op, build(l), build(r))
        }
    }
}

fn render(n: &Node) -> String { format!("{:?}", n) }

proptest! {
    #[test]
    fn live_count_returns_to_baseline(shapes in prop::collection::vec(shape(), 1..4),
                                      steps in prop::collection::vec(step(), 0..40)) {
        // neutral nodes are created once per thread and stay alive
        let _ = (Node::nil(), Node::zero(), Node::one());
        let baseline = live_nodes();
        {
            let mut roots: Vec<(Node, String)> = shapes.iter().map(|s| { let n = build(s); let r = render(&n); (n, r) }).collect();
            for st in steps {
                if roots.is_empty() { break }
                let len = roots.len();
                match st {
                    Step::Share(i) => { let (n, r) = roots[i % len].clone(); roots.push((n.same_as(), r)); }
                    Step::Release(i) => { roots.swap_remove(i % len); }
                    Step::Isolate(i) => {
                        let mut n = roots[i % len].0.clone();
                        let f = n.flags() ^ FENCE;
                        n.isolated().set_flags(f);
                        let r = render(&n);
                        roots.push((n, r));
                    }
                    Step::Graft(i, j) => {
                        let host = roots[i % len].0.clone();
                        let scion = roots[j % len].0.clone();
                        if let Some(target) = host.right().cloned() {
                            let grafted = backbone(&host, &target, scion);
                            prop_assert!(grafted.is_some());
                            if let Some(g) = grafted {
                                let r = render(&g);
                                roots.push((g, r));
                            }
                        }
                    }
                }
                for (n, r) in roots.iter() {
                    prop_assert_eq!(&render(n), r);
                }
                if roots.is_empty() {
                    prop_assert_eq!(live_nodes(), baseline);
                } else {
                    prop_assert!(live_nodes() > baseline);
                }
            }
        }
        prop_assert_eq!(live_nodes(), baseline);
    }
}

#[test]
fn shared_subtrees_are_counted_once() {
    let before = live_nodes();
    let leaf = Node::atom(b"x");
    let pair = Node::binary(Op::Plus, leaf.same_as(), leaf.same_as());
    assert_eq!(live_nodes(), before + 2);
    let again = pair.same_as();
    assert_eq!(live_nodes(), before + 2);
    drop(pair);
    drop(leaf);
    assert_eq!(live_nodes(), before + 2);
    drop(again);
    assert_eq!(live_nodes(), before);
}
