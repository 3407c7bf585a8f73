use crate::rollup::model::{CycleGroup, RollupError, RollupReport, TeamTotal};
use crate::storage::repository::CrewRepository;
use log::warn;
use sea_orm::DatabaseConnection;
use std::collections::{BTreeMap, HashMap};

pub struct RollupService;

impl RollupService {
    /// 对外暴露的聚合查询：每个成员的团队薪资合计，按 id 升序。
    ///
    /// 聚合对闭环中的成员中止并上报，其余部分照常计算；
    /// 只有当闭环吞掉了全部数据、没有任何干净节点时才整体报错。
    /// 结果每次即时重算，不做持久化。
    pub async fn team_totals(db: &DatabaseConnection) -> Result<RollupReport, RollupError> {
        let rows = CrewRepository::load_all(db).await?;
        let report = compute_rollup(rows.iter().map(|m| (m.id, m.manager_id, m.salary)));

        if report.totals.is_empty() && !report.cycles.is_empty() {
            let members = report
                .cycles
                .iter()
                .flat_map(|c| c.members.iter().copied())
                .collect();
            return Err(RollupError::HierarchyCycle(members));
        }

        for cycle in &report.cycles {
            warn!("检测到上级闭环，相关成员已从聚合中剔除: {:?}", cycle.members);
        }

        Ok(report)
    }
}

/// 纯内存的森林聚合
///
/// 不依赖存储引擎的递归查询能力：先沿上级链着色找出闭环，
/// 再对干净部分建 children 映射并用显式栈做后序求和，
/// 深层级也不会递归爆栈，闭环也不会死循环。
pub fn compute_rollup<I>(rows: I) -> RollupReport
where
    I: IntoIterator<Item = (i64, Option<i64>, f64)>,
{
    let mut salary: BTreeMap<i64, f64> = BTreeMap::new();
    let mut parent: BTreeMap<i64, Option<i64>> = BTreeMap::new();
    for (id, manager, pay) in rows {
        salary.insert(id, pay);
        parent.insert(id, manager);
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        InProgress,
        Clean,
        Cyclic,
    }

    // 只有闭环上的节点会被剔除。指向闭环的普通节点自身的
    // 下属子树仍然有限，保持干净。
    let mut marks: HashMap<i64, Mark> = HashMap::new();
    let mut cycles: Vec<CycleGroup> = Vec::new();

    for &start in parent.keys() {
        if marks.contains_key(&start) {
            continue;
        }
        let mut path: Vec<i64> = Vec::new();
        let mut cur = start;
        loop {
            match marks.get(&cur).copied() {
                Some(Mark::Clean) | Some(Mark::Cyclic) => {
                    for id in path.drain(..) {
                        marks.insert(id, Mark::Clean);
                    }
                    break;
                }
                Some(Mark::InProgress) => {
                    // cur 必在当前 path 中，自 cur 起的后缀构成闭环
                    let pos = path.iter().position(|&p| p == cur).unwrap_or(0);
                    let mut members = path.split_off(pos);
                    for &id in &members {
                        marks.insert(id, Mark::Cyclic);
                    }
                    members.sort_unstable();
                    cycles.push(CycleGroup { members });
                    for id in path.drain(..) {
                        marks.insert(id, Mark::Clean);
                    }
                    break;
                }
                None => {
                    marks.insert(cur, Mark::InProgress);
                    path.push(cur);
                    match parent.get(&cur).copied().flatten() {
                        Some(next) if parent.contains_key(&next) => cur = next,
                        // 上级为空或不在数据集内，按根处理
                        _ => {
                            for id in path.drain(..) {
                                marks.insert(id, Mark::Clean);
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    // 干净节点之间建 children 映射，找出各棵树的根
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut roots: Vec<i64> = Vec::new();
    for (&id, &manager) in &parent {
        if marks.get(&id).copied() != Some(Mark::Clean) {
            continue;
        }
        match manager {
            Some(m)
                if parent.contains_key(&m) && marks.get(&m).copied() == Some(Mark::Clean) =>
            {
                children.entry(m).or_default().push(id)
            }
            _ => roots.push(id),
        }
    }

    // 显式栈的后序遍历，自底向上求和
    let mut totals: BTreeMap<i64, f64> = BTreeMap::new();
    for &root in &roots {
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                let mut sum = salary.get(&id).copied().unwrap_or(0.0);
                if let Some(kids) = children.get(&id) {
                    for kid in kids {
                        sum += totals.get(kid).copied().unwrap_or(0.0);
                    }
                }
                totals.insert(id, sum);
            } else {
                stack.push((id, true));
                if let Some(kids) = children.get(&id) {
                    for &kid in kids {
                        stack.push((kid, false));
                    }
                }
            }
        }
    }

    cycles.sort_by_key(|c| c.members.first().copied().unwrap_or(i64::MAX));

    RollupReport {
        totals: totals
            .into_iter()
            .map(|(id, total)| TeamTotal { id, total })
            .collect(),
        cycles,
    }
}
