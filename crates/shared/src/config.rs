//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::observability::ObservabilityConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "FORMS";

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 规则引擎配置
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    /// 条件树最大嵌套深度
    pub max_depth: usize,
    /// 单个规则集的最大规则数
    pub max_rules: usize,
    /// 是否在评估结果中附带追踪
    pub trace: bool,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            max_rules: 500,
            trace: false,
        }
    }
}

/// 启动时预加载的数据
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// 规则 JSON 文件（规则数组）
    pub rules_path: Option<PathBuf>,
    /// 表单模板 JSON 文件（模板数组）
    pub templates_path: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub engine: RuleEngineConfig,
    pub observability: ObservabilityConfig,
    pub seed: SeedConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. .env 文件（存在时写入进程环境变量）
    /// 2. config/default.toml（默认配置）
    /// 3. config/{environment}.toml（环境特定配置）
    /// 4. config/{service_name}.toml（服务特定配置）
    /// 5. 环境变量（FORMS_ 前缀，层级用双下划线，如 FORMS_ENGINE__MAX_DEPTH -> engine.max_depth）
    /// 6. 服务端口环境变量（如 FORM_RULES_SERVICE_PORT）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("FORMS_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), service_name, &env)
    }

    /// 从指定目录加载，不读取 .env
    pub fn load_from(config_dir: &Path, service_name: &str, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = Self::get_service_port_from_env(service_name) {
            config.server.port = port;
        }
        if config.observability.service_name.is_empty() {
            config.observability.service_name = config.service_name.clone();
        }

        Ok(config)
    }

    /// 服务端口环境变量
    ///
    /// 将 "form-rules-service" 转换为 "FORM_RULES_SERVICE_PORT"
    fn get_service_port_from_env(service_name: &str) -> Option<u16> {
        let env_var_name = format!("{}_PORT", service_name.to_uppercase().replace('-', "_"));
        std::env::var(&env_var_name)
            .ok()
            .and_then(|v| v.parse().ok())
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
