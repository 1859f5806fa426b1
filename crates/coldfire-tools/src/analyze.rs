use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, trace};

use coldfire_rs::disasm::branch_target;
use coldfire_rs::ea::Ea;
use coldfire_rs::isa::Flow;
use coldfire_rs::stream::BusStream;
use coldfire_rs::{Bus, Decoded, IsaTier, ProgramImage, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeKind {
    Fallthrough,
    Branch,
    CondBranch,
    Call,
}

impl EdgeKind {
    pub fn tag(self) -> &'static str {
        match self {
            EdgeKind::Fallthrough => "ft",
            EdgeKind::Branch => "br",
            EdgeKind::CondBranch => "cbr",
            EdgeKind::Call => "call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: u32,
    pub to: u32,
    pub kind: EdgeKind,
}

/// Result of walking the code reachable from a set of entries.
#[derive(Debug, Default)]
pub struct Walk {
    pub visited: BTreeSet<u32>,
    /// Instruction length in bytes, by address.
    pub widths: HashMap<u32, u32>,
    pub edges: Vec<Edge>,
    /// Instructions after which execution does not fall through.
    pub terminators: HashSet<u32>,
}

/// Target known without running the code: PC-relative branches, and
/// JMP/JSR through an absolute or PC-relative operand.
pub fn static_target(d: &Decoded) -> Option<u32> {
    if let Some(t) = branch_target(d) {
        return Some(t);
    }
    match d.src? {
        Ea::AbsShort(v) => Some(v as i32 as u32),
        Ea::AbsLong(v) => Some(v),
        // The displacement word directly follows the opcode.
        Ea::PcDisp(disp) => Some(d.address.wrapping_add(2).wrapping_add(disp as i32 as u32)),
        _ => None,
    }
}

pub fn analyze_entries(img: &mut ProgramImage, registry: &Registry, isa: IsaTier, entries: &[u32], max_instr: usize) -> Walk {
    let mut walk = Walk::default();
    let mut queue: VecDeque<u32> = entries.iter().copied().filter(|&e| img.is_mapped(e)).collect();
    let mut steps = 0usize;
    while let Some(pc) = queue.pop_front() {
        if steps >= max_instr {
            debug!(max_instr, "instruction budget exhausted");
            break;
        }
        if walk.visited.contains(&pc) {
            continue;
        }
        let Ok(word) = img.read_u16(pc) else { continue };
        let Some(insn) = registry.lookup(word, isa) else {
            trace!(pc = format_args!("{pc:#010x}"), word = format_args!("{word:#06x}"), "undecodable");
            continue;
        };
        let decoded = match BusStream::new(img, pc) {
            Ok(mut s) => insn.decode(&mut s),
            Err(e) => Err(e),
        };
        let Ok(d) = decoded else { continue };
        walk.visited.insert(pc);
        steps += 1;
        walk.widths.insert(pc, d.len());
        let ft = pc.wrapping_add(d.len());
        let target = static_target(&d);

        let mut edge = |to: u32, kind: EdgeKind, queue: &mut VecDeque<u32>| {
            walk.edges.push(Edge { from: pc, to, kind });
            if img.is_mapped(to) {
                queue.push_back(to);
            }
        };
        let falls_through = match insn.def().flow {
            Flow::Next => true,
            Flow::Branch | Flow::Indirect => {
                if let Some(t) = target {
                    edge(t, EdgeKind::Branch, &mut queue);
                }
                false
            }
            Flow::CondBranch => {
                if let Some(t) = target {
                    edge(t, EdgeKind::CondBranch, &mut queue);
                }
                true
            }
            Flow::Call => {
                if let Some(t) = target {
                    edge(t, EdgeKind::Call, &mut queue);
                }
                true
            }
            Flow::Return | Flow::Stop => false,
        };
        if falls_through {
            edge(ft, EdgeKind::Fallthrough, &mut queue);
        } else {
            walk.terminators.insert(pc);
        }
    }
    walk
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeOut {
    pub from: u32,
    pub to: u32,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionOut {
    pub entry: u32,
    pub blocks: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub entries: Vec<u32>,
    pub blocks: Vec<Block>,
    pub edges: Vec<EdgeOut>,
    pub functions: Vec<FunctionOut>,
}

/// Cut the walk into basic blocks, lift edges to block level and collect
/// the blocks reachable from each entry.
pub fn build_report(walk: &Walk, entries: &[u32]) -> Report {
    // Targets of control transfers start blocks, and so does the fallthrough
    // successor of anything that can transfer control.
    let branching: HashSet<u32> = walk.edges.iter().filter(|e| e.kind != EdgeKind::Fallthrough).map(|e| e.from).collect();
    let mut starts: BTreeSet<u32> = entries.iter().copied().collect();
    starts.extend(
        walk.edges
            .iter()
            .filter(|e| e.kind != EdgeKind::Fallthrough || branching.contains(&e.from))
            .map(|e| e.to),
    );

    let mut blocks = Vec::new();
    let mut owner: HashMap<u32, u32> = HashMap::new();
    for &start in &starts {
        if !walk.visited.contains(&start) || owner.contains_key(&start) {
            continue;
        }
        let mut cur = start;
        loop {
            owner.insert(cur, start);
            let Some(&w) = walk.widths.get(&cur) else { break };
            let next = cur.wrapping_add(w);
            let end = walk.terminators.contains(&cur)
                || !walk.visited.contains(&next)
                || starts.contains(&next)
                || owner.contains_key(&next);
            if end {
                blocks.push(Block { start, end: next });
                break;
            }
            cur = next;
        }
    }

    let edges: Vec<EdgeOut> = walk
        .edges
        .iter()
        .filter(|e| e.kind != EdgeKind::Fallthrough || starts.contains(&e.to))
        .map(|e| EdgeOut { from: owner.get(&e.from).copied().unwrap_or(e.from), to: e.to, kind: e.kind.tag().to_string() })
        .collect();

    let mut adj: HashMap<u32, Vec<u32>> = HashMap::new();
    for e in &edges {
        adj.entry(e.from).or_default().push(e.to);
    }
    let functions = entries
        .iter()
        .map(|&entry| {
            let mut seen: BTreeSet<u32> = BTreeSet::new();
            let mut q = VecDeque::from([entry]);
            while let Some(b) = q.pop_front() {
                if !seen.insert(b) {
                    continue;
                }
                q.extend(adj.get(&b).into_iter().flatten().copied());
            }
            FunctionOut { entry, blocks: seen.into_iter().collect() }
        })
        .collect();

    Report { entries: entries.to_vec(), blocks, edges, functions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn image(words: &[u16]) -> ProgramImage {
        let mut img = ProgramImage::new();
        img.write_words(0, words);
        img
    }

    #[test]
    fn conditional_branch_splits_blocks() {
        // 0: tst.l d0 / 2: beq.s 6 / 4: nop / 6: rts
        let mut img = image(&[0x4A80, 0x6702, 0x4E71, 0x4E75]);
        let registry = Registry::build();
        let walk = analyze_entries(&mut img, &registry, IsaTier::C, &[0], 100);
        assert_eq!(walk.visited.iter().copied().collect::<Vec<_>>(), vec![0, 2, 4, 6]);
        assert!(walk.edges.contains(&Edge { from: 2, to: 6, kind: EdgeKind::CondBranch }));
        assert!(walk.edges.contains(&Edge { from: 2, to: 4, kind: EdgeKind::Fallthrough }));
        assert!(walk.terminators.contains(&6));

        let report = build_report(&walk, &[0]);
        assert_eq!(
            report.blocks,
            vec![Block { start: 0, end: 4 }, Block { start: 4, end: 6 }, Block { start: 6, end: 8 }]
        );
        assert_eq!(report.functions[0].blocks, vec![0, 4, 6]);
    }

    #[test]
    fn call_and_absolute_jump() {
        // 0: bsr.s 6 / 2: jmp (0x000a).w / 6: rts / 8: nop / a: rts
        let mut img = image(&[0x6104, 0x4EF8, 0x000A, 0x4E75, 0x4E71, 0x4E75]);
        let registry = Registry::build();
        let walk = analyze_entries(&mut img, &registry, IsaTier::C, &[0], 100);
        assert!(walk.edges.contains(&Edge { from: 0, to: 6, kind: EdgeKind::Call }));
        assert!(walk.edges.contains(&Edge { from: 2, to: 0xA, kind: EdgeKind::Branch }));
        assert!(!walk.visited.contains(&8));
    }

    #[test]
    fn budget_limits_the_walk() {
        let mut img = image(&[0x4E71; 8]);
        let walk = analyze_entries(&mut img, &Registry::build(), IsaTier::C, &[0], 3);
        assert_eq!(walk.visited.len(), 3);
    }
}
