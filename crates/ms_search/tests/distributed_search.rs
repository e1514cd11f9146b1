// crates/ms_search/tests/distributed_search.rs

//! 分布式搜索与串行搜索的等价性测试
//!
//! 串行网格切分为 N 个分区，在 N 个线程进程上运行分布式搜索，
//! 把各进程的记录行合并后与串行结果逐行比较（报告只含全局编号）。

use std::time::Duration;

use glam::DVec3;

use ms_comm::{Communicator, ThreadComm};
use ms_mesh::{partition, point_cloud, EntityKind, PartitionStrategy, RectMeshGenerator, UnstructuredMesh};
use ms_search::{
    par_search_containment, par_search_nearest_dst_to_src, par_search_nearest_src_to_dst, search_containment,
    search_nearest_dst_to_src, search_nearest_src_to_dst, SearchConfig, SearchError, SearchResult, UnmappedAction,
};

const STRATEGIES: [PartitionStrategy; 2] = [PartitionStrategy::Strips, PartitionStrategy::RoundRobin];

fn scattered(n: usize, seed: u64, lo: DVec3, hi: DVec3) -> Vec<DVec3> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|_| lo + (hi - lo) * DVec3::new(next(), next(), 0.0))
        .collect()
}

fn lines(result: &SearchResult) -> Vec<String> {
    result.iter().map(|r| r.to_string()).collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

/// 在 `n` 个进程上运行 `search`，返回合并后的记录行
fn run_distributed<F>(
    src: &UnstructuredMesh,
    dst: &UnstructuredMesh,
    n: usize,
    strategy: PartitionStrategy,
    search: F,
) -> Vec<String>
where
    F: Fn(&UnstructuredMesh, &UnstructuredMesh, &ThreadComm) -> ms_search::Result<SearchResult> + Sync,
{
    let src_parts = partition(src, n, strategy).unwrap();
    let dst_parts = partition(dst, n, strategy).unwrap();
    let per_rank = ThreadComm::run(n, |comm| {
        let r = comm.rank() as usize;
        let result = search(&src_parts[r], &dst_parts[r], &comm).unwrap();
        lines(&result)
    });
    sorted(per_rank.into_iter().flatten().collect())
}

#[test]
fn node_containment_matches_serial() {
    let src = RectMeshGenerator::new(8, 6, 4.0, 3.0).build().unwrap();
    let dst = RectMeshGenerator::new(9, 7, 3.8, 2.8)
        .with_origin(DVec3::new(0.1, 0.1, 0.0))
        .triangles(true)
        .build()
        .unwrap();
    let config = SearchConfig::default();
    let serial = search_containment(&src, &dst, EntityKind::Node, UnmappedAction::Error, &config).unwrap();
    let expected = sorted(lines(&serial));

    for n in 2..=4 {
        for strategy in STRATEGIES {
            let got = run_distributed(&src, &dst, n, strategy, |s, d, comm| {
                par_search_containment(s, d, EntityKind::Node, UnmappedAction::Error, &config, comm)
            });
            assert_eq!(got, expected, "ranks={} strategy={}", n, strategy);
        }
    }
}

#[test]
fn element_overlap_matches_serial() {
    let src = RectMeshGenerator::new(6, 6, 3.0, 3.0).triangles(true).build().unwrap();
    let dst = RectMeshGenerator::new(4, 5, 3.0, 3.0).build().unwrap();
    let config = SearchConfig::default();
    let serial = search_containment(&src, &dst, EntityKind::Element, UnmappedAction::Error, &config).unwrap();
    let expected = sorted(lines(&serial));
    assert_eq!(expected.len(), 20);

    for n in [2, 3] {
        for strategy in STRATEGIES {
            let got = run_distributed(&src, &dst, n, strategy, |s, d, comm| {
                par_search_containment(s, d, EntityKind::Element, UnmappedAction::Error, &config, comm)
            });
            assert_eq!(got, expected, "ranks={} strategy={}", n, strategy);
        }
    }
}

#[test]
fn nearest_src_to_dst_matches_serial() {
    let src = point_cloud(0, &scattered(120, 7, DVec3::ZERO, DVec3::new(8.0, 8.0, 0.0)), 0).unwrap();
    let dst = point_cloud(0, &scattered(60, 29, DVec3::new(-3.0, -3.0, 0.0), DVec3::new(11.0, 11.0, 0.0)), 500).unwrap();
    let config = SearchConfig::default();
    let serial = search_nearest_src_to_dst(&src, &dst, EntityKind::Node, UnmappedAction::Error, &config).unwrap();
    let expected = sorted(lines(&serial));
    assert_eq!(expected.len(), 60);

    for n in 2..=4 {
        for strategy in STRATEGIES {
            let got = run_distributed(&src, &dst, n, strategy, |s, d, comm| {
                par_search_nearest_src_to_dst(s, d, EntityKind::Node, UnmappedAction::Error, &config, comm)
            });
            assert_eq!(got, expected, "ranks={} strategy={}", n, strategy);
        }
    }
}

#[test]
fn nearest_elements_matches_serial() {
    let src = RectMeshGenerator::new(5, 5, 5.0, 5.0).build().unwrap();
    let dst = RectMeshGenerator::new(3, 2, 9.0, 4.0)
        .with_origin(DVec3::new(-2.0, 0.5, 0.0))
        .triangles(true)
        .build()
        .unwrap();
    let config = SearchConfig::default();
    let serial = search_nearest_src_to_dst(&src, &dst, EntityKind::Element, UnmappedAction::Error, &config).unwrap();
    let expected = sorted(lines(&serial));

    for strategy in STRATEGIES {
        let got = run_distributed(&src, &dst, 3, strategy, |s, d, comm| {
            par_search_nearest_src_to_dst(s, d, EntityKind::Element, UnmappedAction::Error, &config, comm)
        });
        assert_eq!(got, expected, "strategy={}", strategy);
    }
}

#[test]
fn nearest_dst_to_src_matches_serial() {
    let src = point_cloud(0, &scattered(80, 41, DVec3::ZERO, DVec3::new(6.0, 6.0, 0.0)), 0).unwrap();
    let dst = RectMeshGenerator::new(3, 3, 6.0, 6.0).build().unwrap();
    let config = SearchConfig::default();
    let serial = search_nearest_dst_to_src(&src, &dst, EntityKind::Node, UnmappedAction::Ignore, &config).unwrap();
    let expected = sorted(lines(&serial));
    assert_eq!(expected.len(), 80);

    for n in 2..=4 {
        for strategy in STRATEGIES {
            let got = run_distributed(&src, &dst, n, strategy, |s, d, comm| {
                par_search_nearest_dst_to_src(s, d, EntityKind::Node, UnmappedAction::Ignore, &config, comm)
            });
            assert_eq!(got, expected, "ranks={} strategy={}", n, strategy);
        }
    }
}

#[test]
fn dst_to_src_unreached_destinations_agree_across_ranks() {
    // 所有源点都靠近原点，远处的目标节点没有被任何源点选中
    let src = point_cloud(0, &scattered(10, 3, DVec3::ZERO, DVec3::new(0.2, 0.2, 0.0)), 0).unwrap();
    let dst = RectMeshGenerator::new(2, 2, 10.0, 10.0).build().unwrap();
    let config = SearchConfig::default();
    let serial = search_nearest_dst_to_src(&src, &dst, EntityKind::Node, UnmappedAction::Error, &config);
    let (serial_gid, serial_count) = match serial.unwrap_err() {
        SearchError::Unmapped { gid, count, .. } => (gid, count),
        other => panic!("unexpected: {:?}", other),
    };
    assert_eq!((serial_gid, serial_count), (1, 8));

    let src_parts = partition(&src, 3, PartitionStrategy::RoundRobin).unwrap();
    let dst_parts = partition(&dst, 3, PartitionStrategy::RoundRobin).unwrap();
    let outcomes = ThreadComm::run(3, |comm| {
        let r = comm.rank() as usize;
        par_search_nearest_dst_to_src(
            &src_parts[r],
            &dst_parts[r],
            EntityKind::Node,
            UnmappedAction::Error,
            &config,
            &comm,
        )
        .map(|res| res.len())
    });
    for outcome in outcomes {
        match outcome {
            Err(SearchError::Unmapped { gid, count, .. }) => assert_eq!((gid, count), (serial_gid, serial_count)),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

#[test]
fn unmapped_error_is_uniform_across_ranks() {
    let src = RectMeshGenerator::new(4, 4, 2.0, 2.0).build().unwrap();
    let mut pts = scattered(20, 13, DVec3::ZERO, DVec3::new(2.0, 2.0, 0.0));
    pts.push(DVec3::new(5.0, 5.0, 0.0));
    pts.push(DVec3::new(-5.0, 1.0, 0.0));
    let dst = point_cloud(0, &pts, 0).unwrap();
    let config = SearchConfig::default();

    let src_parts = partition(&src, 4, PartitionStrategy::Strips).unwrap();
    let dst_parts = partition(&dst, 4, PartitionStrategy::Strips).unwrap();
    let outcomes = ThreadComm::run(4, |comm| {
        let r = comm.rank() as usize;
        par_search_containment(
            &src_parts[r],
            &dst_parts[r],
            EntityKind::Node,
            UnmappedAction::Error,
            &config,
            &comm,
        )
        .map(|res| res.len())
    });
    assert_eq!(outcomes.len(), 4);
    for outcome in outcomes {
        match outcome {
            Err(SearchError::Unmapped { kind, gid, count, .. }) => {
                assert_eq!(kind, EntityKind::Node);
                assert_eq!((gid, count), (20, 2));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

#[test]
fn ranks_without_entities_still_participate() {
    // 目标点全部落在一个分区；源网格只在部分进程上有单元
    let src = RectMeshGenerator::new(2, 1, 2.0, 1.0).build().unwrap();
    let dst = point_cloud(0, &[DVec3::new(0.25, 0.5, 0.0), DVec3::new(1.75, 0.5, 0.0)], 0).unwrap();
    let config = SearchConfig::default();
    let serial = search_containment(&src, &dst, EntityKind::Node, UnmappedAction::Error, &config).unwrap();
    let expected = sorted(lines(&serial));

    let got = run_distributed(&src, &dst, 4, PartitionStrategy::Strips, |s, d, comm| {
        par_search_containment(s, d, EntityKind::Node, UnmappedAction::Error, &config, comm)
    });
    assert_eq!(got, expected);
}

#[test]
fn remote_queries_are_counted() {
    let src = RectMeshGenerator::new(4, 1, 4.0, 1.0).build().unwrap();
    let dst = point_cloud(0, &[DVec3::new(3.5, 0.5, 0.0), DVec3::new(0.5, 0.5, 0.0)], 0).unwrap();
    let config = SearchConfig::default();
    let src_parts = partition(&src, 2, PartitionStrategy::Strips).unwrap();
    let dst_parts = partition(&dst, 2, PartitionStrategy::Strips).unwrap();
    let stats = ThreadComm::run(2, |comm| {
        let r = comm.rank() as usize;
        let result = par_search_containment(
            &src_parts[r],
            &dst_parts[r],
            EntityKind::Node,
            UnmappedAction::Error,
            &config,
            &comm,
        )
        .unwrap();
        result.stats().clone()
    });
    let sent: usize = stats.iter().map(|s| s.remote_queries_sent).sum();
    let served: usize = stats.iter().map(|s| s.remote_queries_served).sum();
    assert_eq!(sent, served);
    assert_eq!(stats.iter().map(|s| s.matched).sum::<usize>(), 2);
}

/// 两个四边形 (gid 0, 1) 加一个坍缩为对角线的三角形 (gid 2)
fn quads_with_collapsed_triangle() -> UnstructuredMesh {
    let mut b = UnstructuredMesh::builder(0);
    let n: Vec<u32> = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| b.add_node(i as u64, DVec3::new(x, y, 0.0)))
        .collect();
    b.add_element(0, ms_geo::ElementShape::Quad4, &[n[0], n[1], n[4], n[3]]).unwrap();
    b.add_element(1, ms_geo::ElementShape::Quad4, &[n[1], n[2], n[5], n[4]]).unwrap();
    b.add_element(2, ms_geo::ElementShape::Tri3, &[n[0], n[4], n[0]]).unwrap();
    b.build().unwrap()
}

#[test]
fn dst_to_src_degenerate_destinations_are_not_unmapped() {
    let src = RectMeshGenerator::new(4, 2, 2.0, 1.0).build().unwrap();
    let dst = quads_with_collapsed_triangle();
    let config = SearchConfig::default();
    let serial = search_nearest_dst_to_src(&src, &dst, EntityKind::Element, UnmappedAction::Error, &config).unwrap();
    let expected = sorted(lines(&serial));
    assert_eq!(expected.len(), 8);

    for n in [2, 3] {
        for strategy in STRATEGIES {
            let got = run_distributed(&src, &dst, n, strategy, |s, d, comm| {
                par_search_nearest_dst_to_src(s, d, EntityKind::Element, UnmappedAction::Error, &config, comm)
            });
            assert_eq!(got, expected, "ranks={} strategy={}", n, strategy);
        }
    }
}

#[test]
fn absent_rank_fails_search_with_protocol_error() {
    let src = RectMeshGenerator::new(6, 2, 3.0, 1.0).build().unwrap();
    let dst = point_cloud(0, &scattered(12, 5, DVec3::ZERO, DVec3::new(3.0, 1.0, 0.0)), 0).unwrap();
    let config = SearchConfig::default();
    let src_parts = partition(&src, 3, PartitionStrategy::Strips).unwrap();
    let dst_parts = partition(&dst, 3, PartitionStrategy::Strips).unwrap();

    let comms = ThreadComm::builder(3).timeout(Duration::from_millis(100)).build().unwrap();
    let outcomes = ThreadComm::run_with(comms, |comm| {
        let r = comm.rank() as usize;
        if r == 1 {
            // 进程 1 保持存活但不进入搜索
            std::thread::sleep(Duration::from_millis(600));
            return None;
        }
        Some(
            par_search_containment(
                &src_parts[r],
                &dst_parts[r],
                EntityKind::Node,
                UnmappedAction::Error,
                &config,
                &comm,
            )
            .map(|res| res.len()),
        )
    });

    assert!(outcomes[1].is_none());
    for (rank, outcome) in outcomes.iter().enumerate().filter(|(r, _)| *r != 1) {
        match outcome {
            Some(Err(err @ SearchError::Protocol { .. })) => {
                assert!(err.is_protocol());
                if let SearchError::Protocol { rank: at, peer, .. } = err {
                    assert_eq!(*at as usize, rank);
                    assert_eq!(*peer, Some(1));
                }
            }
            other => panic!("rank {}: unexpected {:?}", rank, other),
        }
    }
}
