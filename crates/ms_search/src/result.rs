// crates/ms_search/src/result.rs

//! 搜索结果模型
//!
//! # 记录类型
//!
//! - [`ElementMatch`]: 单元重叠搜索，一个目标单元对应若干源单元（按全局编号排序、去重）
//! - [`NodeMatch`]: 点定位或最近邻搜索，一个目标实体对应一个源实体，附带参数坐标或距离
//!
//! # 生命周期
//!
//! [`SearchResult`] 由搜索入口创建，调用方在使用完毕后显式调用
//! [`SearchResult::release`]（或 [`crate::destroy_search_result`]）释放。
//! `release` 按值消费句柄，重复释放和释放后使用在编译期即被拒绝。
//!
//! # 排序
//!
//! 记录按（目标全局编号, 源全局编号）排序，打印输出只包含全局编号，
//! 因此串行与分布式搜索的输出可以直接比较。

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::time::Duration;

use ms_geo::ParametricCoords;
use ms_mesh::{EntityRef, GlobalId};

use crate::types::SearchMethod;

/// 节点匹配的定位信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchLocus {
    /// 目标点在源单元内的参数坐标
    Parametric(ParametricCoords),
    /// 目标到源实体的距离
    Distance(f64),
}

/// 单元重叠匹配
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMatch {
    /// 目标单元
    pub dst: EntityRef,
    /// 重叠的源单元
    pub sources: Vec<EntityRef>,
}

/// 点匹配
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMatch {
    /// 目标实体
    pub dst: EntityRef,
    /// 源实体
    pub source: EntityRef,
    /// 参数坐标或距离
    pub locus: MatchLocus,
}

/// 一条匹配记录
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRecord {
    /// 单元重叠
    Element(ElementMatch),
    /// 点定位 / 最近邻
    Node(NodeMatch),
}

impl MatchRecord {
    /// 目标实体
    pub fn dst(&self) -> &EntityRef {
        match self {
            Self::Element(m) => &m.dst,
            Self::Node(m) => &m.dst,
        }
    }

    /// 源实体
    pub fn sources(&self) -> &[EntityRef] {
        match self {
            Self::Element(m) => &m.sources,
            Self::Node(m) => std::slice::from_ref(&m.source),
        }
    }

    fn sort_key(&self) -> (GlobalId, GlobalId) {
        (self.dst().gid, self.sources().first().map_or(0, |s| s.gid))
    }
}

impl fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(m) => {
                write!(f, "dst {} {} -> src", m.dst.kind, m.dst.gid)?;
                for s in &m.sources {
                    write!(f, " {}", s.gid)?;
                }
                Ok(())
            }
            Self::Node(m) => {
                write!(f, "dst {} {} -> src {} {}", m.dst.kind, m.dst.gid, m.source.kind, m.source.gid)?;
                match m.locus {
                    MatchLocus::Parametric([a, b, c]) => write!(f, " pcoord [{:.6}, {:.6}, {:.6}]", a, b, c),
                    MatchLocus::Distance(d) => write!(f, " distance {:.6e}", d),
                }
            }
        }
    }
}

/// 搜索统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// 参与搜索的消费端实体数
    pub consumers: usize,
    /// 已匹配的实体数
    pub matched: usize,
    /// 未映射的实体数（本进程）
    pub unmapped: usize,
    /// 索引中的提供端实体数
    pub indexed: usize,
    /// 因几何退化被排除的提供端实体数
    pub degenerate_skipped: usize,
    /// 精确几何测试次数
    pub candidates_tested: usize,
    /// 最近邻搜索的扩展次数
    pub expansions: usize,
    /// 发往其他进程的查询数
    pub remote_queries_sent: usize,
    /// 为其他进程处理的查询数
    pub remote_queries_served: usize,
    /// 总耗时
    pub duration: Duration,
}

impl SearchStats {
    /// 合并另一份统计
    pub fn merge(&mut self, other: &SearchStats) {
        self.consumers += other.consumers;
        self.matched += other.matched;
        self.unmapped += other.unmapped;
        self.indexed += other.indexed;
        self.degenerate_skipped += other.degenerate_skipped;
        self.candidates_tested += other.candidates_tested;
        self.expansions += other.expansions;
        self.remote_queries_sent += other.remote_queries_sent;
        self.remote_queries_served += other.remote_queries_served;
        self.duration += other.duration;
    }
}

/// 搜索结果句柄
#[derive(Debug)]
pub struct SearchResult {
    method: SearchMethod,
    records: Vec<MatchRecord>,
    stats: SearchStats,
    released: bool,
}

impl SearchResult {
    /// 由记录创建（记录会被排序）
    pub fn new(method: SearchMethod, mut records: Vec<MatchRecord>, stats: SearchStats) -> Self {
        for r in records.iter_mut() {
            if let MatchRecord::Element(m) = r {
                m.sources.sort();
                m.sources.dedup_by_key(|s| s.gid);
            }
        }
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()).then_with(|| a.dst().cmp(b.dst())));
        Self {
            method,
            records,
            stats,
            released: false,
        }
    }

    /// 搜索方法
    pub fn method(&self) -> SearchMethod {
        self.method
    }

    /// 全部记录（已排序）
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    /// 记录迭代器
    pub fn iter(&self) -> std::slice::Iter<'_, MatchRecord> {
        self.records.iter()
    }

    /// 记录数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 统计信息
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// 目标全局编号对应的全部记录
    pub fn find(&self, dst_gid: GlobalId) -> &[MatchRecord] {
        let lo = self.records.partition_point(|r| r.dst().gid < dst_gid);
        let hi = self.records.partition_point(|r| r.dst().gid <= dst_gid);
        &self.records[lo..hi]
    }

    /// 按源实体分组：源全局编号 -> 匹配到的目标实体
    pub fn group_by_source(&self) -> BTreeMap<GlobalId, Vec<EntityRef>> {
        let mut groups: BTreeMap<GlobalId, Vec<EntityRef>> = BTreeMap::new();
        for r in &self.records {
            for s in r.sources() {
                groups.entry(s.gid).or_default().push(*r.dst());
            }
        }
        groups
    }

    /// 写出确定性的可读报告
    pub fn write_report<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        write!(w, "{}", self)
    }

    /// 取出记录（消费句柄）
    pub fn into_records(mut self) -> Vec<MatchRecord> {
        self.released = true;
        std::mem::take(&mut self.records)
    }

    /// 显式释放
    pub fn release(mut self) {
        tracing::debug!(method = %self.method, records = self.records.len(), "释放搜索结果");
        self.released = true;
    }
}

impl Drop for SearchResult {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(
                method = %self.method,
                records = self.records.len(),
                "搜索结果未显式释放, 随作用域结束回收"
            );
        }
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a MatchRecord;
    type IntoIter = std::slice::Iter<'a, MatchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "search result ({}): {} records", self.method, self.records.len())?;
        for r in &self.records {
            writeln!(f, "  {}", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_mesh::EntityKind;

    fn node(gid: u64) -> EntityRef {
        EntityRef::new(EntityKind::Node, 0, gid as u32, gid)
    }

    fn elem(rank: u32, gid: u64) -> EntityRef {
        EntityRef::new(EntityKind::Element, rank, 0, gid)
    }

    fn sample() -> SearchResult {
        let records = vec![
            MatchRecord::Node(NodeMatch {
                dst: node(5),
                source: elem(1, 9),
                locus: MatchLocus::Distance(0.5),
            }),
            MatchRecord::Node(NodeMatch {
                dst: node(2),
                source: elem(0, 9),
                locus: MatchLocus::Parametric([0.25, 0.5, 0.0]),
            }),
            MatchRecord::Node(NodeMatch {
                dst: node(2),
                source: elem(0, 3),
                locus: MatchLocus::Distance(0.0),
            }),
        ];
        SearchResult::new(SearchMethod::NearestDstToSrc, records, SearchStats::default())
    }

    #[test]
    fn test_records_sorted() {
        let result = sample();
        let keys: Vec<(u64, u64)> = result.iter().map(|r| (r.dst().gid, r.sources()[0].gid)).collect();
        assert_eq!(keys, vec![(2, 3), (2, 9), (5, 9)]);
        assert_eq!(result.find(2).len(), 2);
        assert!(result.find(4).is_empty());
        result.release();
    }

    #[test]
    fn test_element_sources_deduplicated() {
        let records = vec![MatchRecord::Element(ElementMatch {
            dst: elem(0, 1),
            sources: vec![elem(1, 7), elem(0, 4), elem(0, 7)],
        })];
        let result = SearchResult::new(SearchMethod::Containment, records, SearchStats::default());
        let gids: Vec<u64> = result.records()[0].sources().iter().map(|s| s.gid).collect();
        assert_eq!(gids, vec![4, 7]);
    }

    #[test]
    fn test_report_is_deterministic() {
        let mut out = Vec::new();
        sample().write_report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "search result (nearest-dst-to-src): 3 records");
        assert_eq!(lines[1], "  dst node 2 -> src element 3 distance 0.000000e0");
        assert_eq!(lines[2], "  dst node 2 -> src element 9 pcoord [0.250000, 0.500000, 0.000000]");
        assert_eq!(text, sample().to_string());
    }

    #[test]
    fn test_group_by_source() {
        let groups = sample().group_by_source();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&9].iter().map(|d| d.gid).collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn test_into_records() {
        let records = sample().into_records();
        assert_eq!(records.len(), 3);
    }
}
