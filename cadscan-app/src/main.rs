use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use cadscan_config::{AppConfig, ConfigError};
use cadscan_core::geometry::BoundingBox;
use cadscan_engine::extents::drawing_extents;
use cadscan_engine::pipeline::{self, ExtractionRequest, SearchOptions};
use cadscan_io::{DocumentLoader, DxfFacade, JsonResultWriter};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "cadscan",
    version,
    about = "按查询框提取 DXF 图纸中的几何与标注信息"
)]
struct Cli {
    /// 配置文件路径，缺省时读取 CADSCAN_CONFIG 或 ./config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 提取查询框内的实体并写出 JSON
    Extract(ExtractArgs),
    /// 打印图纸范围（左下角与右上角）
    Extents {
        /// 输入 DXF 文件
        input: PathBuf,
    },
}

#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
struct ExtractArgs {
    /// 输入 DXF 文件
    input: PathBuf,
    /// 输出 JSON 文件
    output: PathBuf,
    xmin: i64,
    ymin: i64,
    xmax: i64,
    ymax: i64,
    /// 查询框每次平移的距离，缺省为查询框高度
    #[arg(long)]
    step: Option<f64>,
    /// 迭代上限，计数超过该值后停止搜索
    #[arg(long)]
    max_iterations: Option<u32>,
    /// 不搜索线性标注
    #[arg(long)]
    no_search: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = load_configuration(cli.config.as_deref());
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AppConfig::default(),
    };
    init_logging(&config, cli.verbose);
    if let Err(err) = &loaded {
        report_config_error(err);
    }

    let outcome = match cli.command {
        Command::Extract(args) => run_extract(&config, args),
        Command::Extents { input } => run_extents(&input),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "执行失败");
            eprintln!("错误：{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_extract(config: &AppConfig, args: ExtractArgs) -> Result<()> {
    let bbox = BoundingBox::new(
        args.xmin as f64,
        args.ymin as f64,
        args.xmax as f64,
        args.ymax as f64,
    );
    let search_enabled = config.search.enabled && !args.no_search;
    let request = ExtractionRequest {
        bbox,
        search: search_enabled.then(|| SearchOptions {
            step: args.step.or(config.search.step),
            max_iterations: args.max_iterations.unwrap_or(config.search.max_iterations),
        }),
    };
    info!(input = %args.input.display(), %bbox, search = search_enabled, "开始提取");

    let writer = JsonResultWriter::with_indent(config.output.indent);
    let extraction = pipeline::process(
        &DxfFacade::new(),
        &writer,
        &args.input,
        &args.output,
        &request,
    )
    .with_context(|| format!("处理 {} 失败", args.input.display()))?;

    if let Some(summary) = extraction.search {
        match summary.window {
            Some(window) if summary.found > 0 => {
                println!("在查询框 {window} 内找到 {} 个线性标注", summary.found);
            }
            _ => println!("经过 {} 次迭代未找到线性标注", summary.iterations),
        }
    }
    println!("结果已保存到 {}", args.output.display());
    Ok(())
}

fn run_extents(input: &Path) -> Result<()> {
    let document = DxfFacade::new()
        .load(input)
        .with_context(|| format!("读取 {} 失败", input.display()))?;
    let extents = drawing_extents(&document).context("统计图纸范围失败")?;
    match extents {
        Some(extents) => {
            println!(
                "左下角: ({}, {})",
                extents.lower_left.x(),
                extents.lower_left.y()
            );
            println!(
                "右上角: ({}, {})",
                extents.upper_right.x(),
                extents.upper_right.y()
            );
        }
        None => println!("图纸中没有可统计范围的实体"),
    }
    Ok(())
}

fn load_configuration(override_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    }
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Invalid { .. } | ConfigError::Context { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
