use std::collections::HashMap;

use stackflow_common::{error::Error, stack::StackConfig};

mod graph;

pub use graph::DependencyGraph;

/// Ordered stack names plus their partition into waves.
/// ---
/// Every stack appears strictly after all of its dependencies, both in
/// `order` and across `waves`. Built once per run and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<String>,
    waves: Vec<Vec<String>>,
    dependencies: HashMap<String, Vec<String>>,
}

impl ExecutionPlan {
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Groups of mutually independent stacks; wave N only depends on waves < N.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    pub fn dependencies_of(&self, stack: &str) -> &[String] {
        self.dependencies
            .get(stack)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn position(&self, stack: &str) -> Option<usize> {
        self.order.iter().position(|name| name == stack)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct DependencyResolver;

impl DependencyResolver {
    /// Computes the execution plan for `stacks`.
    /// ---
    /// Stacks with no ordering constraint between them keep their input order,
    /// so resolving the same input twice always yields the same plan.
    pub fn resolve(stacks: &[StackConfig]) -> Result<ExecutionPlan, Error> {
        let graph = DependencyGraph::new(stacks)?;
        let (order, wave_of) = graph.topological_order()?;

        let wave_count = wave_of.iter().max().map_or(0, |max| max + 1);
        let mut waves: Vec<Vec<String>> = vec![Vec::new(); wave_count];

        for (idx, wave) in wave_of.iter().enumerate() {
            waves[*wave].push(graph.stack_name(idx).to_string());
        }

        let dependencies = (0..graph.len())
            .map(|idx| {
                (
                    graph.stack_name(idx).to_string(),
                    graph
                        .dependencies_of(idx)
                        .iter()
                        .map(|dep| graph.stack_name(*dep).to_string())
                        .collect(),
                )
            })
            .collect();

        Ok(ExecutionPlan {
            order: order
                .into_iter()
                .map(|idx| graph.stack_name(idx).to_string())
                .collect(),
            waves,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(name: &str, deps: &[&str]) -> StackConfig {
        StackConfig::new(name, format!("./{}", name), format!("org/{}/dev", name))
            .with_dependencies(deps.iter().copied())
    }

    fn assert_respects_dependencies(stacks: &[StackConfig], plan: &ExecutionPlan) {
        for stack in stacks {
            let idx = plan.position(&stack.name).unwrap();
            for dep in &stack.dependencies {
                assert!(
                    plan.position(dep).unwrap() < idx,
                    "{} must come after {} in {:?}",
                    stack.name,
                    dep,
                    plan.order()
                );
            }
        }
    }

    #[test]
    fn test_dependency_comes_first() {
        let plan = DependencyResolver::resolve(&[stack("net", &[]), stack("app", &["net"])]).unwrap();
        assert_eq!(plan.order(), ["net", "app"]);
        assert_eq!(plan.waves(), [vec!["net".to_string()], vec!["app".to_string()]]);
    }

    #[test]
    fn test_reorders_out_of_order_input() {
        let plan = DependencyResolver::resolve(&[stack("app", &["net"]), stack("net", &[])]).unwrap();
        assert_eq!(plan.order(), ["net", "app"]);
    }

    #[test]
    fn test_independent_stacks_keep_input_order() {
        let stacks = [stack("c", &[]), stack("a", &[]), stack("b", &[])];
        let plan = DependencyResolver::resolve(&stacks).unwrap();
        assert_eq!(plan.order(), ["c", "a", "b"]);
        assert_eq!(plan.waves().len(), 1);
        assert_eq!(plan.waves()[0], ["c", "a", "b"]);
    }

    #[test]
    fn test_diamond_waves() {
        let stacks = [
            stack("app", &["db", "cache"]),
            stack("db", &["net"]),
            stack("cache", &["net"]),
            stack("net", &[]),
            stack("dns", &[]),
        ];
        let plan = DependencyResolver::resolve(&stacks).unwrap();

        assert_respects_dependencies(&stacks, &plan);
        assert_eq!(plan.order(), ["net", "db", "cache", "app", "dns"]);
        assert_eq!(
            plan.waves(),
            [
                vec!["net".to_string(), "dns".to_string()],
                vec!["db".to_string(), "cache".to_string()],
                vec!["app".to_string()],
            ]
        );
        assert_eq!(plan.dependencies_of("app"), ["db", "cache"]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let stacks = [
            stack("observability", &["eks"]),
            stack("eks", &["vpc"]),
            stack("rds", &["vpc"]),
            stack("vpc", &["ipam"]),
            stack("ipam", &[]),
            stack("kafka", &["eks"]),
        ];
        let first = DependencyResolver::resolve(&stacks).unwrap();
        let second = DependencyResolver::resolve(&stacks).unwrap();
        assert_eq!(first, second);
        assert_respects_dependencies(&stacks, &first);
    }

    #[test]
    fn test_generated_dags_are_ordered() {
        // Each stack i depends on a deterministic subset of stacks with a higher index,
        // so inputs arrive in reverse dependency order.
        for size in 1..12usize {
            let stacks: Vec<StackConfig> = (0..size)
                .map(|i| {
                    let deps: Vec<String> = (i + 1..size)
                        .filter(|j| (i * 7 + j * 3) % 4 != 0)
                        .map(|j| format!("s{}", j))
                        .collect();
                    StackConfig::new(format!("s{}", i), "./s", "dev").with_dependencies(deps)
                })
                .collect();

            let plan = DependencyResolver::resolve(&stacks).unwrap();
            assert_eq!(plan.len(), size);
            assert_respects_dependencies(&stacks, &plan);

            for (wave_idx, wave) in plan.waves().iter().enumerate() {
                for name in wave {
                    for dep in plan.dependencies_of(name) {
                        let dep_wave = plan.waves().iter().position(|w| w.contains(dep)).unwrap();
                        assert!(dep_wave < wave_idx);
                    }
                }
            }
        }
    }

    #[test]
    fn test_two_stack_cycle() {
        let err = DependencyResolver::resolve(&[stack("a", &["b"]), stack("b", &["a"])]).unwrap_err();
        match err {
            Error::DependencyCycle { cycle } => assert_eq!(cycle, ["a", "b"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = DependencyResolver::resolve(&[stack("a", &["a"])]).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { cycle } if cycle == ["a"]));
    }

    #[test]
    fn test_cycle_excludes_stacks_merely_downstream_of_it() {
        let stacks = [
            stack("root", &[]),
            stack("app", &["x"]),
            stack("x", &["y", "root"]),
            stack("y", &["z"]),
            stack("z", &["x"]),
        ];
        let err = DependencyResolver::resolve(&stacks).unwrap_err();
        match err {
            Error::DependencyCycle { cycle } => assert_eq!(cycle, ["x", "y", "z"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let err = DependencyResolver::resolve(&[stack("app", &["net"])]).unwrap_err();
        match err {
            Error::UnknownDependency { stack, dependency } => {
                assert_eq!(stack, "app");
                assert_eq!(dependency, "net");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_stack() {
        let err = DependencyResolver::resolve(&[stack("net", &[]), stack("net", &[])]).unwrap_err();
        assert!(matches!(err, Error::DuplicateStack(name) if name == "net"));
    }

    #[test]
    fn test_repeated_dependency_is_collapsed() {
        let plan =
            DependencyResolver::resolve(&[stack("net", &[]), stack("app", &["net", "net"])]).unwrap();
        assert_eq!(plan.order(), ["net", "app"]);
        assert_eq!(plan.dependencies_of("app"), ["net"]);
    }

    #[test]
    fn test_empty_input() {
        let plan = DependencyResolver::resolve(&[]).unwrap();
        assert!(plan.is_empty());
        assert!(plan.waves().is_empty());
    }
}
