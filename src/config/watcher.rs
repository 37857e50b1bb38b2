//! 配置文件监控模块
//!
//! 监听配置文件变化并标记为待重载，实际重载由运行器在下一个检测周期开始时完成

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 变更标记，记录最近一次文件变更时间
#[derive(Debug, Default)]
struct ChangeFlag {
    dirty: AtomicBool,
    last_change: Mutex<Option<Instant>>,
}

impl ChangeFlag {
    fn mark(&self) {
        if let Ok(mut last) = self.last_change.lock() {
            *last = Some(Instant::now());
        }
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// 变更已稳定超过防抖时间时取走标记
    fn take_if_settled(&self, debounce: Duration) -> bool {
        if !self.dirty.load(Ordering::SeqCst) {
            return false;
        }
        let settled = match self.last_change.lock() {
            Ok(last) => last.map_or(true, |at| at.elapsed() >= debounce),
            Err(_) => true,
        };
        settled && self.dirty.swap(false, Ordering::SeqCst)
    }
}

/// 配置文件监控器
pub struct ConfigWatcher {
    /// 配置文件路径
    config_path: PathBuf,
    /// 文件系统监控器
    watcher: Option<RecommendedWatcher>,
    /// 变更标记
    flag: Arc<ChangeFlag>,
    /// 防抖动延迟
    debounce_delay: Duration,
}

impl ConfigWatcher {
    /// 创建新的配置监控器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `debounce_delay` - 防抖动延迟时间
    pub fn new<P: AsRef<Path>>(config_path: P, debounce_delay: Duration) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        Self::validate_config_path(&config_path)?;

        Ok(Self {
            config_path,
            watcher: None,
            flag: Arc::new(ChangeFlag::default()),
            debounce_delay,
        })
    }

    /// 验证配置文件路径
    fn validate_config_path(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", path.display()));
        }
        if !path.is_file() {
            return Err(anyhow::anyhow!("路径不是文件: {}", path.display()));
        }
        if let Some(extension) = path.extension() {
            if extension != "toml" {
                warn!("配置文件扩展名不是.toml: {}", path.display());
            }
        }
        std::fs::File::open(path)
            .map(|_| ())
            .with_context(|| format!("无法读取配置文件 {}", path.display()))
    }

    /// 启动配置文件监控
    pub fn start(&mut self) -> Result<()> {
        info!("启动配置文件监控: {}", self.config_path.display());

        let target = self
            .config_path
            .canonicalize()
            .unwrap_or_else(|_| self.config_path.clone());
        let file_name = target.file_name().map(|n| n.to_os_string());
        let flag = Arc::clone(&self.flag);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if Self::is_target_file_event(&event, file_name.as_deref()) {
                        debug!("检测到配置文件变更事件: {:?}", event.kind);
                        flag.mark();
                    }
                }
                Err(e) => error!("文件监控事件错误: {}", e),
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("创建文件监控器失败")?;

        // 监控配置文件所在目录，兼容编辑器的替换式保存
        let watch_path = target.parent().unwrap_or(&target);
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", watch_path.display()))?;

        self.watcher = Some(watcher);
        info!("配置文件监控已启动");
        Ok(())
    }

    /// 检查是否是目标文件的事件
    fn is_target_file_event(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
        match &event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => event
                .paths
                .iter()
                .any(|path| path.file_name() == file_name),
            _ => false,
        }
    }

    /// 取走待重载标记
    ///
    /// # 返回
    /// * `bool` - 自上次调用后配置文件是否发生过变更
    pub fn take_pending_reload(&self) -> bool {
        self.flag.take_if_settled(self.debounce_delay)
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("配置文件监控已停止");
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_watcher_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[global]\nlog_level = \"info\"").unwrap();

        let result = ConfigWatcher::new(temp_file.path(), Duration::from_millis(100));
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_file_validation() {
        let result = ConfigWatcher::validate_config_path(Path::new("/nonexistent/file.toml"));
        assert!(result.is_err());

        let temp_file = NamedTempFile::new().unwrap();
        assert!(ConfigWatcher::validate_config_path(temp_file.path()).is_ok());
    }

    #[test]
    fn test_change_flag_debounce() {
        let flag = ChangeFlag::default();
        assert!(!flag.take_if_settled(Duration::ZERO));

        flag.mark();
        // 变更尚未稳定
        assert!(!flag.take_if_settled(Duration::from_secs(60)));
        assert!(flag.take_if_settled(Duration::ZERO));
        // 标记只被取走一次
        assert!(!flag.take_if_settled(Duration::ZERO));
    }

    #[test]
    fn test_target_file_event_matching() {
        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/site-vitals/config.toml"));
        assert!(ConfigWatcher::is_target_file_event(
            &event,
            Some(std::ffi::OsStr::new("config.toml"))
        ));
        assert!(!ConfigWatcher::is_target_file_event(
            &event,
            Some(std::ffi::OsStr::new("other.toml"))
        ));

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::Any))
            .add_path(PathBuf::from("/etc/site-vitals/config.toml"));
        assert!(!ConfigWatcher::is_target_file_event(
            &removed,
            Some(std::ffi::OsStr::new("config.toml"))
        ));
    }
}
