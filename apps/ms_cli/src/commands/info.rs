// apps/ms_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 显示网格概况、生效的运行选项和默认搜索配置。

use anyhow::{Context, Result};
use clap::Args;
use ms_mesh::{EntityKind, SearchMesh, UnstructuredMesh};
use ms_search::SearchConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use super::RunOptions;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 网格文件路径
    #[arg(short, long)]
    pub mesh: Option<PathBuf>,

    /// 显示默认配置
    #[arg(long)]
    pub defaults: bool,
}

/// 执行信息命令
pub fn execute(args: InfoArgs, run: RunOptions) -> Result<()> {
    info!("=== MeshSearch 信息 ===");
    println!("=== 运行选项 ===");
    println!("进程数: {}", run.ranks);
    println!("未映射策略: {}", run.unmapped);

    if let Some(path) = &args.mesh {
        let mesh = UnstructuredMesh::from_file(path)
            .with_context(|| format!("加载网格失败: {}", path.display()))?;
        print_mesh_info(&mesh);
    }

    if args.defaults || args.mesh.is_none() {
        print_default_config()?;
    }

    Ok(())
}

fn print_mesh_info(mesh: &UnstructuredMesh) {
    println!("=== 网格信息 ===");
    println!("进程: {}", mesh.rank());
    println!(
        "节点: {} (本进程所有 {})",
        mesh.n_nodes(),
        mesh.owned_entities(EntityKind::Node).len()
    );
    println!("单元: {}", mesh.n_elements());

    let mut shapes: BTreeMap<String, usize> = BTreeMap::new();
    for e in 0..mesh.n_elements() {
        *shapes.entry(format!("{:?}", mesh.element_shape(e))).or_default() += 1;
    }
    for (shape, count) in &shapes {
        println!("  - {}: {}", shape, count);
    }

    let bounds = mesh.node_bounds();
    if !bounds.is_empty() {
        println!("范围: {:?} - {:?}", bounds.min.to_array(), bounds.max.to_array());
    }
}

fn print_default_config() -> Result<()> {
    println!("=== 默认搜索配置 ===");
    let json = serde_json::to_string_pretty(&SearchConfig::default())?;
    println!("{}", json);
    Ok(())
}
