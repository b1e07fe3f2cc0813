use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onedrive_rust::{
    auth::{CredentialProvider, DeviceLogin, OAuthTokenEndpoint, TokenStore},
    common::format_bytes,
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    logging,
    netdisk::{DriveApi, DriveClient, ItemRef},
    DownloadEngine, UploadEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Parser)]
#[command(name = "onedrivecli", version, about = "OneDrive 命令行传输工具")]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 设备码登录
    Auth,
    /// 列出文件夹内容（`/` 为根目录）
    Ls { path: String },
    /// 生成匿名分享链接
    Link { path: String },
    /// 获取直接下载地址
    Dl { path: String },
    /// 下载文件或文件夹
    Download {
        /// 远程路径（以 `/` 开头）或条目 ID
        remote: String,
        /// 本地路径（`.` 为当前目录）
        local: PathBuf,
    },
    /// 上传文件或文件夹
    Upload {
        /// 远程目标路径
        remote: String,
        /// 本地路径（`.` 为当前目录）
        local: PathBuf,
    },
    /// 查看存储空间
    Storage,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 配置加载失败时使用默认值，日志初始化后再报告
    let (config, config_error) = match AppConfig::load_from_file(&cli.config).await {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let log_guard = logging::init_logging(&config.log);

    if let Some(e) = config_error {
        if cli.config.exists() {
            warn!("配置文件无效，使用默认配置: {:#}", e);
        } else {
            info!("未找到配置文件 {:?}，使用默认配置", cli.config);
        }
    }

    if let Err(e) = run(cli.command, &config).await {
        error!("{:#}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

fn drive_client(config: &AppConfig) -> Result<DriveClient> {
    let store = TokenStore::new(&config.drive.token_file);
    let endpoint = OAuthTokenEndpoint::new(&config.drive)?;
    let provider = CredentialProvider::new(store, endpoint);
    DriveClient::new(&config.drive, Arc::new(provider))
}

async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Auth => {
            let store = TokenStore::new(&config.drive.token_file);
            let endpoint = OAuthTokenEndpoint::new(&config.drive)?;
            DeviceLogin::new(&endpoint, &store).run().await?;
            println!("✅ 登录成功");
        }

        Command::Ls { path } => {
            let client = drive_client(config)?;
            let children = client
                .list_children(&ItemRef::path(&path))
                .await
                .with_context(|| format!("列出 {} 失败", path))?;

            println!("📂 {}", path);
            for item in children {
                match &item.folder {
                    Some(folder) => println!("📁 {} ({} 项)", item.name, folder.child_count),
                    None => println!(
                        "📄 {} ({:.2} MB)",
                        item.name,
                        item.size as f64 / 1024.0 / 1024.0
                    ),
                }
            }
        }

        Command::Link { path } => {
            let client = drive_client(config)?;
            let url = client
                .create_share_link(&path)
                .await
                .with_context(|| format!("生成 {} 的分享链接失败", path))?;
            println!("🔗 分享链接: {}", url);
        }

        Command::Dl { path } => {
            let client = drive_client(config)?;
            let item = client
                .get_item(&ItemRef::path(&path))
                .await
                .with_context(|| format!("获取 {} 失败", path))?;
            let url = item
                .download_url
                .with_context(|| format!("{} 没有直接下载地址（文件夹无法直接下载）", path))?;
            println!("⬇️ 直接下载地址: {}", url);
        }

        Command::Download { remote, local } => {
            let client = Arc::new(drive_client(config)?);
            let summary = DownloadEngine::new(client, &config.transfer)
                .download(&remote, &local)
                .await
                .with_context(|| format!("下载 {} 失败", remote))?;
            println!(
                "✅ 下载完成: {:?} ({} 个文件, {})",
                summary.target,
                summary.files,
                format_bytes(summary.bytes)
            );
        }

        Command::Upload { remote, local } => {
            let client = Arc::new(drive_client(config)?);
            let summary = UploadEngine::new(client, &config.transfer)
                .upload(&remote, &local)
                .await
                .with_context(|| format!("上传 {:?} 失败", local))?;

            if summary.incomplete.is_empty() {
                println!(
                    "✅ 上传完成: {} ({} 个文件, {})",
                    remote,
                    summary.files,
                    format_bytes(summary.bytes)
                );
            } else {
                println!(
                    "⚠️ 上传结束，{} 个文件存在失败分片，请事后校验: {:?}",
                    summary.incomplete.len(),
                    summary
                        .incomplete
                        .iter()
                        .map(|(path, _)| path.as_str())
                        .collect::<Vec<_>>()
                );
            }
        }

        Command::Storage => {
            let client = drive_client(config)?;
            let quota = client.quota().await.context("查询存储空间失败")?;
            println!(
                "💾 已用空间: {:.2} GB / {:.2} GB",
                quota.used as f64 / GB,
                quota.total as f64 / GB
            );
            println!("🟢 剩余空间: {:.2} GB", quota.remaining as f64 / GB);
        }
    }

    Ok(())
}
