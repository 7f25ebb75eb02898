// SPDX-License-Identifier: MPL-2.0

//! Turn the terminal incompatibility of a failed solve into a
//! human-readable explanation of why no solution exists.

use crate::internal::incompatibility::{Cause, Incompatibility};
use crate::{Map, Package};

/// Reporter trait.
pub trait Reporter<P: Package> {
    /// Output type of the report.
    type Output;

    /// Generate a report from the terminal incompatibility of a failed
    /// solve, for the given root package.
    fn report(incompatibility: &Incompatibility<P>, root: &P) -> Self::Output;
}

/// Default reporter able to generate a plain-text report, walking the cause
/// graph and numbering the conclusions that are referenced more than once.
pub struct DefaultStringReporter;

impl<P: Package> Reporter<P> for DefaultStringReporter {
    type Output = String;

    fn report(incompatibility: &Incompatibility<P>, root: &P) -> String {
        let mut walker = Walker::new(root);
        walker.count_references(incompatibility);
        walker.build(incompatibility);
        walker.lines.join("\n")
    }
}

/// Graph-identity key of an incompatibility node. Equal terms in different
/// nodes stay distinct here; sharing only comes from the cause graph.
type NodeId = *const ();

fn node_id<P: Package>(incompatibility: &Incompatibility<P>) -> NodeId {
    incompatibility as *const Incompatibility<P> as NodeId
}

/// How a cause appears at its use site.
enum CauseKind {
    /// An external leaf, restated inline wherever it is referenced.
    External,
    /// A derived node already printed under the given line number.
    Numbered(usize),
    /// A derived node not explained yet.
    Derived,
}

/// One pending emission step. The walk is driven by an explicit stack so
/// that arbitrarily deep cause graphs cannot exhaust the native stack.
enum Task<'a, P: Package> {
    /// Explain a node (recursing into its causes as needed).
    Build(&'a Incompatibility<P>),
    /// Combine a just-explained derivation with an external cause.
    AndBecauseExternal {
        external: &'a Incompatibility<P>,
        current: &'a Incompatibility<P>,
    },
    /// Combine a just-explained derivation with a numbered one.
    AndBecauseReference {
        referenced: &'a Incompatibility<P>,
        current: &'a Incompatibility<P>,
    },
    /// Conclude from the two derivations explained just above.
    Thus(&'a Incompatibility<P>),
    /// Visual separation between independent sub-derivations.
    Blank,
}

struct Walker<'a, P: Package> {
    root: &'a P,
    lines: Vec<String>,
    /// How many times each derived node is referenced from the graph.
    reference_counts: Map<NodeId, usize>,
    /// Line numbers of shared nodes, assigned sequentially at first print.
    line_numbers: Map<NodeId, usize>,
    next_number: usize,
}

impl<'a, P: Package> Walker<'a, P> {
    fn new(root: &'a P) -> Self {
        Self {
            root,
            lines: Vec::new(),
            reference_counts: Map::default(),
            line_numbers: Map::default(),
            next_number: 1,
        }
    }

    /// Count the references to every derived node reachable from the
    /// terminal incompatibility; nodes referenced more than once get line
    /// numbers instead of being re-explained.
    fn count_references(&mut self, terminal: &'a Incompatibility<P>) {
        let mut stack = vec![terminal];
        while let Some(node) = stack.pop() {
            let Some((lhs, rhs)) = node.causes() else {
                continue;
            };
            for cause in [lhs.as_ref(), rhs.as_ref()] {
                if cause.causes().is_none() {
                    continue;
                }
                let count = self.reference_counts.entry(node_id(cause)).or_insert(0);
                *count += 1;
                if *count == 1 {
                    stack.push(cause);
                }
            }
        }
    }

    fn build(&mut self, terminal: &'a Incompatibility<P>) {
        let mut tasks = vec![Task::Build(terminal)];
        while let Some(task) = tasks.pop() {
            match task {
                Task::Build(current) => self.build_step(current, &mut tasks),
                Task::AndBecauseExternal { external, current } => {
                    let line = format!(
                        "And because {}, {}.",
                        self.external(external),
                        self.conclusion(current)
                    );
                    self.push_line(current, line);
                }
                Task::AndBecauseReference {
                    referenced,
                    current,
                } => {
                    let number = self.line_numbers[&node_id(referenced)];
                    let line = format!(
                        "And because {} ({}), {}.",
                        self.conclusion(referenced),
                        number,
                        self.conclusion(current)
                    );
                    self.push_line(current, line);
                }
                Task::Thus(current) => {
                    let line = format!("Thus, {}.", self.conclusion(current));
                    self.push_line(current, line);
                }
                Task::Blank => self.lines.push(String::new()),
            }
        }
    }

    /// Emit the explanation of one node, scheduling sub-derivations on the
    /// task stack. Tasks are pushed in reverse execution order.
    fn build_step(&mut self, current: &'a Incompatibility<P>, tasks: &mut Vec<Task<'a, P>>) {
        if self.line_numbers.contains_key(&node_id(current)) {
            // Already explained under a number elsewhere in the graph.
            return;
        }
        let Some((lhs, rhs)) = current.causes() else {
            // An external terminal incompatibility: no derivation to walk.
            let line = format!("{}.", self.external(current));
            self.lines.push(line);
            return;
        };
        let (lhs, rhs) = (lhs.as_ref(), rhs.as_ref());
        // A shared sub-derivation is explained once on its own, picking up
        // its line number, and referenced from then on.
        for child in [rhs, lhs] {
            let shared = self
                .reference_counts
                .get(&node_id(child))
                .is_some_and(|&count| count > 1);
            if shared && !self.line_numbers.contains_key(&node_id(child)) {
                tasks.push(Task::Build(current));
                tasks.push(Task::Blank);
                tasks.push(Task::Build(child));
                return;
            }
        }
        match (self.classify(lhs), self.classify(rhs)) {
            (CauseKind::External, CauseKind::External) => {
                let line = format!(
                    "Because {} and {}, {}.",
                    self.external(lhs),
                    self.external(rhs),
                    self.conclusion(current)
                );
                self.push_line(current, line);
            }
            (CauseKind::Numbered(n1), CauseKind::Numbered(n2)) => {
                let line = format!(
                    "Because {} ({}) and {} ({}), {}.",
                    self.conclusion(lhs),
                    n1,
                    self.conclusion(rhs),
                    n2,
                    self.conclusion(current)
                );
                self.push_line(current, line);
            }
            (CauseKind::Numbered(number), CauseKind::External) => {
                let line = format!(
                    "Because {} ({}) and {}, {}.",
                    self.conclusion(lhs),
                    number,
                    self.external(rhs),
                    self.conclusion(current)
                );
                self.push_line(current, line);
            }
            (CauseKind::External, CauseKind::Numbered(number)) => {
                let line = format!(
                    "Because {} and {} ({}), {}.",
                    self.external(lhs),
                    self.conclusion(rhs),
                    number,
                    self.conclusion(current)
                );
                self.push_line(current, line);
            }
            (CauseKind::Derived, CauseKind::External) => {
                // TODO: when the nested derivation collapses to a single
                // line, its conclusion could be folded into this sentence
                // instead of being restated; both arms currently emit the
                // same shape.
                if is_single_line(lhs) {
                    tasks.push(Task::AndBecauseExternal {
                        external: rhs,
                        current,
                    });
                    tasks.push(Task::Build(lhs));
                } else {
                    tasks.push(Task::AndBecauseExternal {
                        external: rhs,
                        current,
                    });
                    tasks.push(Task::Build(lhs));
                }
            }
            (CauseKind::External, CauseKind::Derived) => {
                tasks.push(Task::AndBecauseExternal {
                    external: lhs,
                    current,
                });
                tasks.push(Task::Build(rhs));
            }
            (CauseKind::Derived, CauseKind::Numbered(_)) => {
                tasks.push(Task::AndBecauseReference {
                    referenced: rhs,
                    current,
                });
                tasks.push(Task::Build(lhs));
            }
            (CauseKind::Numbered(_), CauseKind::Derived) => {
                tasks.push(Task::AndBecauseReference {
                    referenced: lhs,
                    current,
                });
                tasks.push(Task::Build(rhs));
            }
            (CauseKind::Derived, CauseKind::Derived) => {
                if is_single_line(rhs) {
                    tasks.push(Task::Thus(current));
                    tasks.push(Task::Build(rhs));
                    tasks.push(Task::Build(lhs));
                } else if is_single_line(lhs) {
                    tasks.push(Task::Thus(current));
                    tasks.push(Task::Build(lhs));
                    tasks.push(Task::Build(rhs));
                } else {
                    tasks.push(Task::Thus(current));
                    tasks.push(Task::Build(rhs));
                    tasks.push(Task::Blank);
                    tasks.push(Task::Build(lhs));
                }
            }
        }
    }

    fn classify(&self, node: &Incompatibility<P>) -> CauseKind {
        if node.causes().is_none() {
            CauseKind::External
        } else if let Some(&number) = self.line_numbers.get(&node_id(node)) {
            CauseKind::Numbered(number)
        } else {
            CauseKind::Derived
        }
    }

    /// Emit a line concluding `node`; a shared node is assigned its line
    /// number here, on first print.
    fn push_line(&mut self, node: &Incompatibility<P>, mut line: String) {
        let shared = self
            .reference_counts
            .get(&node_id(node))
            .is_some_and(|&count| count > 1);
        if shared && !self.line_numbers.contains_key(&node_id(node)) {
            let number = self.next_number;
            self.next_number += 1;
            self.line_numbers.insert(node_id(node), number);
            line.push_str(&format!(" ({})", number));
        }
        self.lines.push(line);
    }

    /// The phrase restating an external incompatibility.
    fn external(&self, node: &Incompatibility<P>) -> String {
        match &node.cause {
            Cause::Root => match node.iter().find(|term| !term.positive) {
                Some(dependency) => format!(
                    "root depends on {} {}",
                    dependency.package, dependency.requirement
                ),
                None => node.to_string(),
            },
            Cause::NoAvailableVersion => match node.iter().next() {
                Some(term) => format!(
                    "no versions of {} satisfy {}",
                    term.package, term.requirement
                ),
                None => node.to_string(),
            },
            Cause::Dependency(_) => node.to_string(),
            Cause::Conflict { .. } => unreachable!("an external cause cannot be a conflict"),
        }
    }

    /// The phrase concluding a derived incompatibility.
    fn conclusion(&self, node: &Incompatibility<P>) -> String {
        if node.is_failure(self.root) {
            return "version solving failed".to_string();
        }
        let terms: Vec<_> = node.iter().collect();
        match terms.as_slice() {
            [depender, dependency] if depender.positive && !dependency.positive => format!(
                "{} {} requires {} {}",
                depender.package,
                depender.requirement,
                dependency.package,
                dependency.requirement
            ),
            [dependency, depender] if depender.positive && !dependency.positive => format!(
                "{} {} requires {} {}",
                depender.package,
                depender.requirement,
                dependency.package,
                dependency.requirement
            ),
            _ => node.to_string(),
        }
    }
}

/// Whether a derived node prints as a single `Because … , … .` line: both
/// of its causes are external.
fn is_single_line<P: Package>(node: &Incompatibility<P>) -> bool {
    match node.causes() {
        Some((lhs, rhs)) => lhs.causes().is_none() && rhs.causes().is_none(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::term::Term;
    use crate::version_set::tests::version;
    use crate::version_set::{Requirement, VersionSet};

    fn caret(major: u64, minor: u64, patch: u64) -> Requirement {
        Requirement::Versions(VersionSet::up_to_next_major(version(major, minor, patch)))
    }

    fn root_dep(dep: &'static str, requirement: Requirement) -> Arc<Incompatibility<&'static str>> {
        Arc::new(Incompatibility::new(
            vec![
                Term::exact("root", version(1, 0, 0)),
                Term::negative(dep, requirement),
            ],
            Cause::Root,
            &"root",
        ))
    }

    fn dependency(
        package: &'static str,
        requirement: Requirement,
        dep: (&'static str, Requirement),
    ) -> Arc<Incompatibility<&'static str>> {
        Arc::new(Incompatibility::from_dependency(package, requirement, dep, &"root").unwrap())
    }

    fn no_versions(
        package: &'static str,
        requirement: Requirement,
    ) -> Arc<Incompatibility<&'static str>> {
        Arc::new(Incompatibility::no_available_version(
            Term::positive(package, requirement),
            &"root",
        ))
    }

    fn conflict(
        terms: Vec<Term<&'static str>>,
        conflict: Arc<Incompatibility<&'static str>>,
        other: Arc<Incompatibility<&'static str>>,
    ) -> Arc<Incompatibility<&'static str>> {
        Arc::new(Incompatibility::new(
            terms,
            Cause::Conflict { conflict, other },
            &"root",
        ))
    }

    #[test]
    fn two_external_causes_make_one_line() {
        let derived = conflict(
            vec![Term::positive("a", caret(1, 0, 0))],
            dependency("a", caret(1, 0, 0), ("b", caret(2, 0, 0))),
            no_versions("b", caret(2, 0, 0)),
        );
        assert_eq!(
            DefaultStringReporter::report(&derived, &"root"),
            "Because a >=1.0.0, <2.0.0 depends on b >=2.0.0, <3.0.0 \
             and no versions of b satisfy >=2.0.0, <3.0.0, \
             a >=1.0.0, <2.0.0 is forbidden."
        );
    }

    #[test]
    fn terminal_failure_is_phrased_as_such() {
        let forbidden = conflict(
            vec![Term::positive("a", caret(1, 0, 0))],
            dependency("a", caret(1, 0, 0), ("b", caret(2, 0, 0))),
            no_versions("b", caret(2, 0, 0)),
        );
        let terminal = conflict(
            vec![Term::exact("root", version(1, 0, 0))],
            forbidden,
            root_dep("a", caret(1, 0, 0)),
        );
        let report = DefaultStringReporter::report(&terminal, &"root");
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Because a >=1.0.0, <2.0.0 depends on"));
        assert_eq!(
            lines[1],
            "And because root depends on a >=1.0.0, <2.0.0, version solving failed."
        );
    }

    /// A nested derivation followed by an external cause emits the same
    /// `And because` shape whether or not the nested derivation collapsed
    /// to a single line.
    #[test]
    fn single_line_arms_collapse_identically() {
        let single = conflict(
            vec![Term::positive("a", caret(1, 0, 0))],
            dependency("a", caret(1, 0, 0), ("b", caret(2, 0, 0))),
            no_versions("b", caret(2, 0, 0)),
        );
        let nested = conflict(
            vec![Term::positive("c", caret(1, 0, 0))],
            dependency("c", caret(1, 0, 0), ("a", caret(1, 0, 0))),
            single.clone(),
        );
        let deep = conflict(
            vec![Term::exact("root", version(1, 0, 0))],
            nested,
            root_dep("c", caret(1, 0, 0)),
        );
        let shallow = conflict(
            vec![Term::exact("root", version(1, 0, 0))],
            single,
            root_dep("a", caret(1, 0, 0)),
        );
        let deep_report = DefaultStringReporter::report(&deep, &"root");
        let shallow_report = DefaultStringReporter::report(&shallow, &"root");
        assert!(deep_report
            .lines()
            .last()
            .unwrap()
            .starts_with("And because root depends on"));
        assert!(shallow_report
            .lines()
            .last()
            .unwrap()
            .starts_with("And because root depends on"));
    }

    #[test]
    fn shared_nodes_are_numbered_once_and_referenced() {
        let shared = conflict(
            vec![Term::positive("a", caret(1, 0, 0))],
            dependency("a", caret(1, 0, 0), ("b", caret(2, 0, 0))),
            no_versions("b", caret(2, 0, 0)),
        );
        let left = conflict(
            vec![Term::positive("c", caret(1, 0, 0))],
            dependency("c", caret(1, 0, 0), ("a", caret(1, 0, 0))),
            shared.clone(),
        );
        let terminal = conflict(
            vec![Term::exact("root", version(1, 0, 0))],
            left,
            shared,
        );
        let report = DefaultStringReporter::report(&terminal, &"root");
        assert!(report.contains("(1)"));
        let first = report.find("(1)").unwrap();
        let last = report.rfind("(1)").unwrap();
        assert!(first < last, "the shared node is printed once then referenced");
        assert!(report
            .lines()
            .last()
            .unwrap()
            .contains("And because a >=1.0.0, <2.0.0 is forbidden (1)"));
    }

    #[test]
    fn external_terminal_is_stated_directly() {
        let external = no_versions("a", caret(1, 0, 0));
        assert_eq!(
            DefaultStringReporter::report(&external, &"root"),
            "no versions of a satisfy >=1.0.0, <2.0.0."
        );
    }
}
