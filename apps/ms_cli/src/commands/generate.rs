// apps/ms_cli/src/commands/generate.rs

//! 网格生成命令
//!
//! 生成矩形（四边形或三角形）或长方体（六面体）结构化网格并保存为 JSON。

use anyhow::{bail, Context, Result};
use clap::Args;
use glam::DVec3;
use ms_mesh::{BoxMeshGenerator, RectMeshGenerator, SearchMesh};
use std::path::PathBuf;
use tracing::info;

/// 网格生成参数
#[derive(Args)]
pub struct GenerateArgs {
    /// x 方向单元数
    #[arg(long)]
    pub nx: usize,

    /// y 方向单元数
    #[arg(long)]
    pub ny: usize,

    /// z 方向单元数（给出时生成六面体网格）
    #[arg(long)]
    pub nz: Option<usize>,

    /// x 方向长度
    #[arg(long, default_value = "1.0")]
    pub lx: f64,

    /// y 方向长度
    #[arg(long, default_value = "1.0")]
    pub ly: f64,

    /// z 方向长度
    #[arg(long, default_value = "1.0")]
    pub lz: f64,

    /// 原点 "x,y,z"
    #[arg(long, default_value = "0,0,0", value_parser = parse_point)]
    pub origin: DVec3,

    /// 生成三角形网格（仅二维）
    #[arg(long)]
    pub triangles: bool,

    /// 节点全局编号起点
    #[arg(long, default_value = "0")]
    pub node_gid_offset: u64,

    /// 单元全局编号起点
    #[arg(long, default_value = "0")]
    pub element_gid_offset: u64,

    /// 输出文件
    #[arg(short, long)]
    pub out: PathBuf,
}

/// 解析 "x,y,z"
pub fn parse_point(s: &str) -> std::result::Result<DVec3, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("无法解析坐标 '{}': {}", p, e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [x, y] => Ok(DVec3::new(*x, *y, 0.0)),
        [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
        _ => Err(format!("坐标需要 2 或 3 个分量, 收到 {}", parts.len())),
    }
}

/// 执行生成命令
pub fn execute(args: GenerateArgs) -> Result<()> {
    let mesh = match args.nz {
        Some(nz) => {
            if args.triangles {
                bail!("--triangles 只适用于二维网格");
            }
            BoxMeshGenerator::new(args.nx, args.ny, nz, DVec3::new(args.lx, args.ly, args.lz))
                .with_origin(args.origin)
                .with_gid_offset(args.node_gid_offset, args.element_gid_offset)
                .build()
                .context("生成六面体网格失败")?
        }
        None => RectMeshGenerator::new(args.nx, args.ny, args.lx, args.ly)
            .with_origin(args.origin)
            .triangles(args.triangles)
            .with_gid_offset(args.node_gid_offset, args.element_gid_offset)
            .build()
            .context("生成矩形网格失败")?,
    };

    mesh.save(&args.out)
        .with_context(|| format!("写出网格失败: {}", args.out.display()))?;
    info!(
        "网格已写出: {} ({} 节点, {} 单元)",
        args.out.display(),
        mesh.n_nodes(),
        mesh.n_elements()
    );
    Ok(())
}
