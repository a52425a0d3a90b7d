use crate::exception::Exception;

use log::{error, warn};
use serde_derive::Deserialize;
use serde_derive::Serialize;

use std::fs::File;
use std::io::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    port: u16,
    local: bool,
    worker_threads: usize,
    #[serde(default = "default_template_dir")]
    template_dir: String,
    #[serde(default = "default_template_extension")]
    template_extension: String,
    #[serde(default = "default_max_request_size")]
    max_request_size: usize,
    #[serde(default = "default_enable_compression")]
    enable_compression: bool,
}

fn default_template_dir() -> String {
    "templates".to_string()
}

fn default_template_extension() -> String {
    "tmpl".to_string()
}

fn default_max_request_size() -> usize {
    1048576 // 1MB
}

fn default_enable_compression() -> bool {
    true
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 9999,
            local: true,
            worker_threads: 0,
            template_dir: default_template_dir(),
            template_extension: default_template_extension(),
            max_request_size: default_max_request_size(),
            enable_compression: default_enable_compression(),
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::ConfigUnreadable(format!("{}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::ConfigUnreadable(format!("{}: {}", filename, e)))?;
        Ok(Self::from_toml_str(&str_val))
    }

    pub fn from_toml_str(str_val: &str) -> Self {
        let mut raw_config = match toml::from_str(str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.max_request_size == 0 {
            warn!("max_request_size被设置为0，这将拒绝所有请求，因此该值将被改为默认值。");
            raw_config.max_request_size = default_max_request_size();
        }
        raw_config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn template_dir(&self) -> &str {
        &self.template_dir
    }

    pub fn template_extension(&self) -> &str {
        &self.template_extension
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    pub fn enable_compression(&self) -> bool {
        self.enable_compression
    }
}
