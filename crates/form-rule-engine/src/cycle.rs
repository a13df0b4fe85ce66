//! 规则集循环依赖检测
//!
//! 写值动作（`setValue` / `calculate`）的目标依赖于该规则条件中引用的字段以及公式中引用的字段。
//! 若依赖关系成环（包括自环），规则集在加载时被拒绝，永远不会进入评估。

use crate::error::{Result, RuleError};
use crate::formula::Formula;
use crate::models::{Action, Rule};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 字段依赖图
///
/// target -> 计算 target 时读取的字段。使用有序容器保证检测结果稳定。
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// 从规则集构建依赖图
    ///
    /// 无法解析的公式不贡献依赖边（公式语法由编译阶段单独校验）。
    pub fn from_rules(rules: &[Rule]) -> Self {
        let mut graph = Self::default();

        for rule in rules {
            let condition_fields = rule.conditions.fields();

            for action in rule.actions.iter().filter(|a| a.writes_value()) {
                let Some(target) = action.target() else {
                    continue;
                };

                for field in &condition_fields {
                    graph.add_edge(target, field);
                }

                if let Action::Calculate { formula, .. } = action {
                    if let Ok(parsed) = Formula::parse(formula) {
                        for reference in parsed.references() {
                            graph.add_edge(target, &reference);
                        }
                    }
                }
            }
        }

        graph
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// 获取计算某字段时依赖的字段
    pub fn dependencies_of(&self, target: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(target)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// 查找一个环，返回形如 `[a, b, ..., a]` 的路径
    ///
    /// 深度优先搜索使用显式栈，依赖链再长也不会耗尽调用栈。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            OnStack,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();

        for start in self.edges.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }

            // (节点, 依赖列表, 下一个待访问的下标)
            let start = start.as_str();
            let mut stack: Vec<(&str, Vec<&str>, usize)> = Vec::new();
            marks.insert(start, Mark::OnStack);
            stack.push((start, self.dependencies_of(start).collect(), 0));

            while let Some((node, deps, next)) = stack.last_mut() {
                let Some(&dep) = deps.get(*next) else {
                    marks.insert(*node, Mark::Done);
                    stack.pop();
                    continue;
                };
                *next += 1;

                match marks.get(dep) {
                    Some(Mark::OnStack) => {
                        let from = stack.iter().position(|(n, _, _)| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[from..].iter().map(|(n, _, _)| n.to_string()).collect();
                        cycle.push(dep.to_string());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(dep, Mark::OnStack);
                        stack.push((dep, self.dependencies_of(dep).collect(), 0));
                    }
                }
            }
        }

        None
    }
}

/// 循环依赖守卫
pub struct CycleGuard;

impl CycleGuard {
    /// 检查规则集，存在环时返回 `RuleError::CyclicRuleSet`
    pub fn check(rules: &[Rule]) -> Result<()> {
        match DependencyGraph::from_rules(rules).find_cycle() {
            Some(cycle) => Err(RuleError::CyclicRuleSet { cycle }),
            None => Ok(()),
        }
    }
}
