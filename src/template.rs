// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTML 模板模块
//!
//! 引擎持有一组具名模板，`Context::html` 按名称执行其中之一。
//!
//! ## 语法
//! - `{{ . }}`：整个数据本身。
//! - `{{ .title }}`、`{{ .user.name }}`：按字段路径取值，数组可用数字下标（`{{ .items.0 }}`）。
//!
//! 数据先被转换为 `serde_json::Value`，字符串输出前做 HTML 转义，
//! 数字与布尔值原样输出，`null` 输出为空，数组和对象以转义后的 JSON 文本输出。

use crate::{exception::Exception, util::escape_html};

use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;
use serde::ser::Serialize;
use serde_json::Value;

use std::{collections::HashMap, fs, path::Path};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*\.([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)?\s*\}\}").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct HtmlTemplates {
    templates: HashMap<String, String>,
}

impl HtmlTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（或替换）一个模板。
    pub fn add(&mut self, name: &str, source: &str) -> &mut Self {
        self.templates.insert(name.to_string(), source.to_string());
        self
    }

    /// 加载目录下所有以 `extension` 结尾的文件，文件名即模板名。子目录不会被递归。
    pub fn load_dir(dir: &Path, extension: &str) -> Result<Self, Exception> {
        let entries = fs::read_dir(dir).map_err(|e| {
            error!("无法读取模板目录{}：{}", dir.display(), e);
            Exception::TemplateLoad(format!("{}: {}", dir.display(), e))
        })?;

        let mut templates = Self::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Exception::TemplateLoad(e.to_string()))?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let source = fs::read_to_string(&path)
                .map_err(|e| Exception::TemplateLoad(format!("{}: {}", path.display(), e)))?;
            debug!("载入模板：{}", name);
            templates.templates.insert(name, source);
        }
        info!("共载入{}个模板", templates.len());
        Ok(templates)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// 以任意可序列化数据执行具名模板。
    pub fn execute<T: Serialize>(&self, name: &str, data: &T) -> Result<String, Exception> {
        let value = serde_json::to_value(data)
            .map_err(|e| Exception::TemplateExecute(name.to_string(), e.to_string()))?;
        self.render(name, &value)
    }

    pub fn render(&self, name: &str, data: &Value) -> Result<String, Exception> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| Exception::TemplateNotFound(name.to_string()))?;

        let mut output = String::with_capacity(source.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(source) {
            // 第 0 组总是存在
            let whole = match captures.get(0) {
                Some(m) => m,
                None => continue,
            };
            output.push_str(&source[last..whole.start()]);

            let field_path = captures.get(1).map(|m| m.as_str()).unwrap_or("");
            let value = lookup(data, field_path).ok_or_else(|| {
                Exception::TemplateExecute(
                    name.to_string(),
                    format!("missing field .{}", field_path),
                )
            })?;
            output.push_str(&escape_html(&display_value(value)));
            last = whole.end();
        }
        output.push_str(&source[last..]);
        Ok(output)
    }
}

fn lookup<'a>(data: &'a Value, field_path: &str) -> Option<&'a Value> {
    if field_path.is_empty() {
        return Some(data);
    }
    field_path
        .split('.')
        .try_fold(data, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
