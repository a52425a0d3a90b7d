// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了框架在请求处理生命周期中可能产生的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖了协议解析错误、模板渲染错误、JSON 编码错误以及配置加载错误。
//! - **语义映射**：每个变体都对应了特定的处理逻辑，便于上层模块将其转化为对应的 HTTP 响应。
//! - **用户友好**：通过实现 `std::fmt::Display`，确保错误信息可以被安全地记录到日志或写入 `fail` 信封。

use std::fmt;

/// 框架处理请求过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求头无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或请求头格式不合法（缺少字段、缺少头部结束标记等）。
    MalformedRequest,
    /// 客户端使用了框架不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了框架不支持的 HTTP 协议版本（仅支持 HTTP/1.0 与 HTTP/1.1）。
    UnsupportedHttpVersion,
    /// 请求报文超过了配置允许的最大长度。对应 `413 Content Too Large`。
    RequestTooLarge,
    /// 模板集合中不存在指定名称的模板。
    TemplateNotFound(String),
    /// 模板执行失败：(模板名, 原因)。
    TemplateExecute(String, String),
    /// 从磁盘加载模板失败。
    TemplateLoad(String),
    /// 数据无法被编码为 JSON。
    JsonEncode(String),
    /// 配置文件无法读取。
    ConfigUnreadable(String),
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed HTTP request"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            RequestTooLarge => write!(f, "Request too large (413)"),
            TemplateNotFound(name) => write!(f, "html/template: {:?} is undefined", name),
            TemplateExecute(name, reason) => {
                write!(f, "template: {}: {}", name, reason)
            }
            TemplateLoad(reason) => write!(f, "Couldn't load templates: {}", reason),
            JsonEncode(reason) => write!(f, "json: {}", reason),
            ConfigUnreadable(reason) => write!(f, "Couldn't read config file: {}", reason),
        }
    }
}

impl std::error::Error for Exception {}
