//! 配置管理器模块
//!
//! 持有当前配置的不可变快照，重载时整体替换并计算差异

use crate::config::loader::{ConfigLoader, TomlConfigLoader};
use crate::config::types::{Config, MonitoredSite};
use crate::notification::event::DetailItem;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 配置差异类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDiff {
    /// 站点添加
    SiteAdded(MonitoredSite),
    /// 站点移除
    SiteRemoved(String),
    /// 站点修改
    SiteModified {
        old: Box<MonitoredSite>,
        new: Box<MonitoredSite>,
    },
    /// 通知渠道变更
    ChannelsModified,
    /// 告警参数变更
    MonitoringModified,
    /// 全局配置修改
    GlobalConfigModified,
}

impl ConfigDiff {
    /// 管理通知的事件标题
    pub fn title(&self) -> &'static str {
        match self {
            ConfigDiff::SiteAdded(_) => "新增监控站点",
            ConfigDiff::SiteRemoved(_) => "删除监控站点",
            ConfigDiff::SiteModified { .. } => "修改监控站点",
            ConfigDiff::ChannelsModified => "通知渠道变更",
            ConfigDiff::MonitoringModified => "告警参数变更",
            ConfigDiff::GlobalConfigModified => "全局配置变更",
        }
    }

    /// 管理通知的详情项
    pub fn details(&self) -> Vec<DetailItem> {
        match self {
            ConfigDiff::SiteAdded(site) => vec![
                DetailItem::new("站点名称", site.name.clone()),
                DetailItem::new("监控地址", site.url.clone()),
                DetailItem::new("启用状态", if site.active { "启用" } else { "停用" }),
            ],
            ConfigDiff::SiteRemoved(name) => vec![DetailItem::new("站点名称", name.clone())],
            ConfigDiff::SiteModified { old, new } => {
                let mut details = vec![DetailItem::new("站点名称", new.name.clone())];
                if old.url != new.url {
                    details.push(DetailItem::new(
                        "监控地址",
                        format!("{} -> {}", old.url, new.url),
                    ));
                }
                if old.active != new.active {
                    details.push(DetailItem::new(
                        "启用状态",
                        if new.active { "启用" } else { "停用" },
                    ));
                }
                details
            }
            ConfigDiff::ChannelsModified
            | ConfigDiff::MonitoringModified
            | ConfigDiff::GlobalConfigModified => Vec::new(),
        }
    }

    /// 是否需要通知关注管理事件的渠道
    pub fn is_notable(&self) -> bool {
        !matches!(self, ConfigDiff::GlobalConfigModified)
    }
}

/// 计算配置差异
pub fn calculate_config_diff(old_config: &Config, new_config: &Config) -> Vec<ConfigDiff> {
    let mut diffs = Vec::new();

    if old_config.global != new_config.global || old_config.web != new_config.web {
        diffs.push(ConfigDiff::GlobalConfigModified);
    }
    if old_config.monitoring != new_config.monitoring
        || old_config.notification != new_config.notification
    {
        diffs.push(ConfigDiff::MonitoringModified);
    }
    if old_config.channels != new_config.channels {
        diffs.push(ConfigDiff::ChannelsModified);
    }

    let old_sites: HashMap<&str, &MonitoredSite> = old_config
        .sites
        .iter()
        .map(|s| (s.name.as_str(), s))
        .collect();

    // 按新配置中的顺序输出，保证差异列表稳定
    for new_site in &new_config.sites {
        match old_sites.get(new_site.name.as_str()) {
            Some(old_site) if *old_site != new_site => {
                diffs.push(ConfigDiff::SiteModified {
                    old: Box::new((*old_site).clone()),
                    new: Box::new(new_site.clone()),
                });
            }
            Some(_) => {}
            None => diffs.push(ConfigDiff::SiteAdded(new_site.clone())),
        }
    }

    for old_site in &old_config.sites {
        if !new_config.sites.iter().any(|s| s.name == old_site.name) {
            diffs.push(ConfigDiff::SiteRemoved(old_site.name.clone()));
        }
    }

    diffs
}

/// 配置管理器
pub struct ConfigManager {
    /// 当前配置快照
    current_config: RwLock<Arc<Config>>,
    /// 配置版本号
    version: RwLock<u64>,
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 配置加载器
    loader: TomlConfigLoader,
}

impl ConfigManager {
    /// 创建新的配置管理器
    ///
    /// # 参数
    /// * `initial_config` - 初始配置
    pub fn new(initial_config: Config) -> Self {
        Self {
            current_config: RwLock::new(Arc::new(initial_config)),
            version: RwLock::new(1),
            config_path: None,
            loader: TomlConfigLoader::new(true),
        }
    }

    /// 创建关联配置文件的管理器，支持 `reload`
    pub fn with_path<P: AsRef<Path>>(initial_config: Config, config_path: P) -> Self {
        Self {
            config_path: Some(config_path.as_ref().to_path_buf()),
            ..Self::new(initial_config)
        }
    }

    /// 获取当前配置快照
    pub async fn snapshot(&self) -> Arc<Config> {
        self.current_config.read().await.clone()
    }

    /// 获取当前版本号
    pub async fn get_version(&self) -> u64 {
        *self.version.read().await
    }

    /// 配置文件路径
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 替换配置
    ///
    /// # 参数
    /// * `new_config` - 新配置（已验证）
    ///
    /// # 返回
    /// * `Vec<ConfigDiff>` - 配置差异，无变更时为空且版本号不变
    pub async fn update_config(&self, new_config: Config) -> Vec<ConfigDiff> {
        let mut current = self.current_config.write().await;
        let diffs = calculate_config_diff(&current, &new_config);

        if diffs.is_empty() {
            debug!("配置无实质性变更，跳过更新");
            return diffs;
        }

        *current = Arc::new(new_config);
        let mut version = self.version.write().await;
        *version += 1;

        info!("配置更新完成，版本: {}，变更项: {}", *version, diffs.len());
        diffs
    }

    /// 从配置文件重新加载
    ///
    /// 加载或验证失败时保留当前配置并返回错误。
    pub async fn reload(&self) -> Result<Vec<ConfigDiff>> {
        let path = self
            .config_path
            .as_ref()
            .context("未关联配置文件，无法重新加载")?;

        let new_config = self
            .loader
            .load_from_file(path)
            .await
            .context("重新加载配置失败")?;

        Ok(self.update_config(new_config).await)
    }
}
