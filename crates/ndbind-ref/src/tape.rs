//! Autograd state of the reference engine: marked variables and the
//! recorded operator tape.

use std::collections::HashMap;

use ndbind_core::{GradReq, OpParams, Result};

use crate::ops::{self, Op, Operand};
use crate::store::View;

/// An operand as it was when the op was recorded.
#[derive(Debug, Clone)]
pub(crate) struct Tracked {
    pub id: u64,
    pub view: View,
}

impl Tracked {
    fn operand(&self) -> Operand {
        (self.view.read(), self.view.shape.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub op: Op,
    pub params: OpParams,
    pub inputs: Vec<Tracked>,
    pub outputs: Vec<Tracked>,
}

/// Gradient destination of a marked variable.
#[derive(Debug, Clone)]
pub(crate) struct Mark {
    pub req: GradReq,
    pub grad: View,
}

#[derive(Debug, Default)]
pub(crate) struct Tape {
    nodes: Vec<Node>,
    marked: HashMap<u64, Mark>,
    recording: bool,
    training: bool,
}

impl Tape {
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Leaving a recording section drops whatever was recorded in it and
    /// not consumed by a backward pass.
    pub fn set_recording(&mut self, on: bool) -> bool {
        let prev = std::mem::replace(&mut self.recording, on);
        if prev && !on {
            self.nodes.clear();
        }
        prev
    }

    pub fn set_training(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.training, on)
    }

    pub fn record(&mut self, node: Node) {
        if self.recording {
            self.nodes.push(node);
        }
    }

    pub fn mark(&mut self, id: u64, mark: Mark) {
        self.marked.insert(id, mark);
    }

    pub fn unmark(&mut self, id: u64) {
        self.marked.remove(&id);
    }

    pub fn grad_of(&self, id: u64) -> Option<&View> {
        self.marked.get(&id).map(|m| &m.grad)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes and marks needed for one backward pass. Without
    /// `retain_graph` the recorded nodes are consumed.
    pub fn take_pass(&mut self, retain_graph: bool) -> (Vec<Node>, HashMap<u64, Mark>) {
        let nodes = if retain_graph {
            self.nodes.clone()
        } else {
            std::mem::take(&mut self.nodes)
        };
        (nodes, self.marked.clone())
    }
}

fn accumulate(grads: &mut HashMap<u64, Vec<f64>>, id: u64, g: Vec<f64>) {
    match grads.get_mut(&id) {
        Some(acc) => acc.iter_mut().zip(&g).for_each(|(a, &v)| *a += v),
        None => {
            grads.insert(id, g);
        }
    }
}

/// Reverse-mode pass over `nodes`, seeded at the heads, writing into the
/// gradient buffers of `marked`. All pending computation must have been
/// executed before this runs.
pub(crate) fn backward(
    nodes: &[Node],
    marked: &HashMap<u64, Mark>,
    seeds: Vec<(u64, Vec<f64>)>,
) -> Result<()> {
    let mut grads: HashMap<u64, Vec<f64>> = HashMap::new();
    for (id, seed) in seeds {
        accumulate(&mut grads, id, seed);
    }

    for node in nodes.iter().rev() {
        let out_grads: Vec<Option<Vec<f64>>> = node
            .outputs
            .iter()
            .map(|o| grads.get(&o.id).cloned())
            .collect();
        if out_grads.iter().all(Option::is_none) {
            continue;
        }
        let inputs: Vec<Operand> = node.inputs.iter().map(Tracked::operand).collect();
        let outputs: Vec<Operand> = node.outputs.iter().map(Tracked::operand).collect();
        let input_grads = ops::gradient(node.op, &node.params, &inputs, &outputs, &out_grads)?;
        for (input, g) in node.inputs.iter().zip(input_grads) {
            if let Some(g) = g {
                accumulate(&mut grads, input.id, g);
            }
        }
    }

    for (id, mark) in marked {
        let Some(g) = grads.get(id) else { continue };
        match mark.req {
            GradReq::Null => {}
            GradReq::Write => mark.grad.write(g),
            GradReq::Add => mark.grad.accumulate(g),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndbind_core::{DType, Shape};

    fn tracked(id: u64, values: &[f64]) -> Tracked {
        let view = View::zeros(Shape::new(&[values.len()]), DType::F32);
        view.write(values);
        Tracked { id, view }
    }

    #[test]
    fn test_chain_rule_through_two_ops() {
        // y = (x * x) + 1, dy/dx = 2x
        let x = tracked(1, &[3.0, -1.0]);
        let sq = tracked(2, &[9.0, 1.0]);
        let y = tracked(3, &[10.0, 2.0]);
        let nodes = vec![
            Node {
                op: Op::Mul,
                params: OpParams::new(),
                inputs: vec![x.clone(), x.clone()],
                outputs: vec![sq.clone()],
            },
            Node {
                op: Op::PlusScalar,
                params: OpParams::new().float("scalar", 1.0),
                inputs: vec![sq],
                outputs: vec![y],
            },
        ];
        let grad = View::zeros(Shape::new(&[2]), DType::F32);
        let marked = HashMap::from([(1, Mark { req: GradReq::Write, grad: grad.clone() })]);
        backward(&nodes, &marked, vec![(3, vec![1.0, 1.0])]).unwrap();
        assert_eq!(grad.read(), vec![6.0, -2.0]);
    }

    #[test]
    fn test_head_that_is_variable_gets_seed() {
        let grad = View::zeros(Shape::new(&[2]), DType::F32);
        let marked = HashMap::from([(7, Mark { req: GradReq::Write, grad: grad.clone() })]);
        backward(&[], &marked, vec![(7, vec![0.5, 2.0])]).unwrap();
        assert_eq!(grad.read(), vec![0.5, 2.0]);
    }

    #[test]
    fn test_add_request_accumulates() {
        let grad = View::zeros(Shape::new(&[1]), DType::F32);
        let mark = Mark { req: GradReq::Add, grad: grad.clone() };
        let marked = HashMap::from([(1, mark)]);
        backward(&[], &marked, vec![(1, vec![1.0])]).unwrap();
        backward(&[], &marked, vec![(1, vec![1.0])]).unwrap();
        assert_eq!(grad.read(), vec![2.0]);
    }

    #[test]
    fn test_take_pass_clears_without_retain() {
        let mut tape = Tape::default();
        tape.set_recording(true);
        tape.record(Node {
            op: Op::Negative,
            params: OpParams::new(),
            inputs: vec![tracked(1, &[1.0])],
            outputs: vec![tracked(2, &[-1.0])],
        });
        assert_eq!(tape.take_pass(true).0.len(), 1);
        assert_eq!(tape.len(), 1);
        assert_eq!(tape.take_pass(false).0.len(), 1);
        assert_eq!(tape.len(), 0);
    }

    #[test]
    fn test_stop_recording_drops_unused_nodes() {
        let mut tape = Tape::default();
        assert!(!tape.set_recording(true));
        for id in 0..3 {
            tape.record(Node {
                op: Op::Negative,
                params: OpParams::new(),
                inputs: vec![tracked(id, &[1.0])],
                outputs: vec![tracked(id + 10, &[-1.0])],
            });
        }
        assert_eq!(tape.len(), 3);
        assert!(tape.set_recording(true));
        assert_eq!(tape.len(), 3);
        assert!(tape.set_recording(false));
        assert_eq!(tape.len(), 0);
    }
}
