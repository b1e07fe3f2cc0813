//! 日志系统配置
//!
//! 控制台输出到 stderr（stdout 留给命令结果），文件按天滚动并自动清理过期日志

use crate::config::LogConfig;
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "onedrive-rust";

/// 日志文件名后缀
const LOG_FILE_SUFFIX: &str = "log";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// 级别优先取 `RUST_LOG`，否则使用配置中的 level。
/// 文件输出初始化失败时回退到仅控制台输出。
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(true)
        .with_writer(std::io::stderr);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return LogGuard { _file_guard: None };
    }

    let appender = match fs::create_dir_all(&config.log_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            // 文件名格式: onedrive-rust.YYYY-MM-DD.log
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix(LOG_FILE_SUFFIX)
                .build(&config.log_dir)
                .map_err(|e| e.to_string())
        }) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!(
                "初始化日志文件失败: {:?}, 错误: {}，回退到仅控制台输出",
                config.log_dir, e
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            return LogGuard { _file_guard: None };
        }
    };

    let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);

    // 文件输出层（不带 ANSI 颜色）
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}",
        config.log_dir, config.retention_days, config.level
    );

    let deleted = cleanup_old_logs(&config.log_dir, config.retention_days);
    if deleted > 0 {
        info!("已清理 {} 个过期日志文件", deleted);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 清理过期日志文件，返回删除数量
///
/// 只处理 `onedrive-rust.YYYY-MM-DD.log` 格式的文件，日期无法解析时按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> usize {
    let today = Local::now().date_naive();
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut deleted_count = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_log_file(filename) {
            continue;
        }

        let expired = match extract_date_from_filename(filename) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => expired_by_modified_time(&entry, retention),
        };

        if expired {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted_count += 1;
                    tracing::debug!("已删除过期日志文件: {:?}", path);
                }
                Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
            }
        }
    }

    deleted_count
}

fn is_log_file(filename: &str) -> bool {
    filename.starts_with(&format!("{}.", LOG_FILE_PREFIX))
        && filename.ends_with(&format!(".{}", LOG_FILE_SUFFIX))
}

/// 从文件名中提取日期
///
/// onedrive-rust.2024-01-31.log -> 2024-01-31
fn extract_date_from_filename(filename: &str) -> Option<chrono::NaiveDate> {
    let name = filename
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(LOG_FILE_SUFFIX)?
        .strip_suffix('.')?;
    chrono::NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

fn expired_by_modified_time(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
        return false;
    };
    let modified: chrono::DateTime<chrono::Utc> = modified.into();
    chrono::Utc::now().signed_duration_since(modified) > retention
}
