// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! 该模块负责把 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体，
//! 并为 `Context` 提供查询参数与表单参数的读取能力。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 2. 请求头（Headers）的提取，查找时大小写不敏感。
//! 3. 按 `Content-Length` 截取请求体。
//! 4. 路径的百分号解码；URL 查询串、`application/x-www-form-urlencoded` 表单
//!    以及 `multipart/form-data` 文本字段的解码。
//!
//! 外部 HTTP 服务也可以通过 `Request::new` 直接构造请求，再交给上下文处理。

use crate::{exception::Exception, param::*};
use bytes::Bytes;
use log::{debug, error, warn};
use mime::Mime;

/// HTTP 头部结束标记
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求行中的原始目标（包含查询字符串）
    target: String,
    /// 去掉查询字符串并完成百分号解码后的路径
    path: String,
    /// 未解码的查询字符串（不含 `?`）
    raw_query: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 按出现顺序保存的请求头
    headers: Vec<(String, String)>,
    /// 客户端标识字符串
    user_agent: String,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 请求体
    body: Bytes,
}

impl Request {
    /// 以方法和请求目标构造一个没有头部与请求体的 HTTP/1.1 请求。
    pub fn new(method: HttpRequestMethod, target: &str) -> Self {
        let (raw_path, raw_query) = split_target(target);
        let path = decode_path(&raw_path).unwrap_or(raw_path);
        Self {
            method,
            target: target.to_string(),
            path,
            raw_query,
            version: HttpVersion::V1_1,
            headers: Vec::new(),
            user_agent: String::new(),
            accept_encoding: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// 追加一个请求头，返回自身以便链式调用。
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.push_header(key, value);
        self
    }

    /// 设置请求体，返回自身以便链式调用。
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn push_header(&mut self, key: &str, value: &str) {
        let key_lower = key.to_lowercase();
        if key_lower == "user-agent" {
            self.user_agent = value.to_string();
        } else if key_lower == "accept-encoding" {
            self.accept_encoding = parse_accept_encoding(value);
        }
        self.headers.push((key.to_string(), value.to_string()));
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 定位头部结束标记，并验证头部是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、目标和协议版本。
    /// 3. 逐行解析请求头。
    /// 4. 按 `Content-Length` 截取请求体，缺失时视为空。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 请求序号，用于在多任务环境下追踪日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let head_end = find_header_end(buffer);
        let head = match std::str::from_utf8(&buffer[..head_end.unwrap_or(buffer.len())]) {
            Ok(head) => head,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求头", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let head_end = match head_end {
            Some(end) => end,
            None => {
                error!("[ID{}]HTTP请求缺少头部结束标记", id);
                return Err(Exception::MalformedRequest);
            }
        };

        let mut lines = head.split(CRLF);

        // 解析请求行 (e.g., "GET /index?id=1 HTTP/1.1")
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method = match HttpRequestMethod::from_token(parts[0]) {
            Some(method) => method,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = parts[parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 目标中夹带空格虽然不规范，但通过 join 尝试恢复
        let target = parts[1..parts.len() - 1].join(" ");
        if let Err(e) = decode_path(&split_target(&target).0) {
            error!("[ID{}]请求路径无法解码：{}", id, target);
            return Err(e);
        }
        let mut request = Request::new(method, &target);
        request.version = version;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => request.push_header(key.trim(), value.trim()),
                None => {
                    warn!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }

        let body_start = head_end + HEADER_TERMINATOR.len();
        let declared = request.content_length().unwrap_or(0);
        let available = buffer.len().saturating_sub(body_start);
        if available < declared {
            debug!(
                "[ID{}]请求体不完整：声明{}字节，实际{}字节",
                id, declared, available
            );
        }
        let body_len = declared.min(available);
        request.body = Bytes::copy_from_slice(&buffer[body_start..body_start + body_len]);

        Ok(request)
    }
}

// --- 查询参数与表单 ---

impl Request {
    /// 解码后的全部查询参数，保持原始顺序。
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        decode_pairs(&self.raw_query)
    }

    /// 指定键的第一个查询参数值。
    pub fn query_value(&self, key: &str) -> Option<String> {
        first_value(self.query_pairs(), key)
    }

    /// 请求体中的表单参数。
    ///
    /// 仅当方法为 POST/PUT/PATCH 时才解析请求体，支持 urlencoded 表单与
    /// `multipart/form-data` 中的文本字段；文件字段被忽略。
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        if !self.method.carries_form() {
            return Vec::new();
        }
        let content_type = match self.content_type().and_then(|t| t.parse::<Mime>().ok()) {
            Some(content_type) => content_type,
            None => return Vec::new(),
        };

        if content_type.type_() == mime::APPLICATION
            && content_type.subtype() == mime::WWW_FORM_URLENCODED
        {
            decode_pairs(&String::from_utf8_lossy(&self.body))
        } else if content_type.type_() == mime::MULTIPART
            && content_type.subtype() == mime::FORM_DATA
        {
            match content_type.get_param(mime::BOUNDARY) {
                Some(boundary) => multipart_pairs(&self.body, boundary.as_str()),
                None => {
                    warn!("multipart表单缺少boundary参数");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        }
    }

    /// 表单值：请求体中的表单参数优先，其次是查询参数。
    pub fn form_value(&self, key: &str) -> Option<String> {
        first_value(self.form_pairs(), key).or_else(|| self.query_value(key))
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取请求目标（含查询参数）
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取未解码的查询字符串
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// 按名称查找请求头，大小写不敏感
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 获取全部请求头
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|v| v.parse::<usize>().ok())
    }

    /// 获取请求体
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// 在缓冲区中查找头部结束标记 `\r\n\r\n` 的起始位置。
pub fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// 从请求头部分读取声明的 `Content-Length`，缺失或非法时为 0。
pub fn declared_content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .split(CRLF)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

fn split_target(target: &str) -> (String, String) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    }
}

/// 百分号解码请求路径。`+` 在路径中保持原样。
fn decode_path(raw: &str) -> Result<String, Exception> {
    urlencoding::decode(raw)
        .map(|path| path.into_owned())
        .map_err(|_| Exception::MalformedRequest)
}

/// 提取 multipart 请求体中的文本字段，带 `filename` 的文件字段被跳过。
fn multipart_pairs(body: &[u8], boundary: &str) -> Vec<(String, String)> {
    // 分隔符前的 CRLF 属于分隔符，补上一个以便统一处理第一个分隔符
    let text = format!("{}{}", CRLF, String::from_utf8_lossy(body));
    let delimiter = format!("{}--{}", CRLF, boundary);

    let mut pairs = Vec::new();
    for part in text.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break; // 结束分隔符
        }
        let part = part.strip_prefix(CRLF).unwrap_or(part);
        let (head, value) = match part.split_once("\r\n\r\n") {
            Some(split) => split,
            None => continue,
        };
        let disposition = head
            .split(CRLF)
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-disposition"))
            .map(|(_, value)| value.trim());
        let disposition = match disposition {
            Some(disposition) => disposition,
            None => continue,
        };
        if disposition_param(disposition, "filename").is_some() {
            continue;
        }
        if let Some(name) = disposition_param(disposition, "name") {
            pairs.push((name, value.to_string()));
        }
    }
    pairs
}

fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    disposition
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}

fn decode_pairs(raw: &str) -> Vec<(String, String)> {
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!("无法解码参数串{}：{}", raw, e);
            Vec::new()
        }
    }
}

fn first_value(pairs: Vec<(String, String)>, key: &str) -> Option<String> {
    pairs.into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

// 这里的逻辑比较简单，只要包含关键词即视为支持
fn parse_accept_encoding(value: &str) -> Vec<HttpEncoding> {
    let mut accept_encoding = vec![];
    if value.contains("gzip") {
        accept_encoding.push(HttpEncoding::Gzip);
    }
    if value.contains("deflate") {
        accept_encoding.push(HttpEncoding::Deflate);
    }
    if value.contains("br") {
        accept_encoding.push(HttpEncoding::Br);
    }
    accept_encoding
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 验证常规 GET 请求的解析，包括路径、查询串和 Headers
    #[test]
    fn test_parse_get_request() {
        let request_str = "GET /hello?name=tom HTTP/1.1\r\nHost: localhost:9999\r\nUser-Agent: Test-Browser\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.target(), "/hello?name=tom");
        assert_eq!(request.path(), "/hello");
        assert_eq!(request.raw_query(), "name=tom");
        assert_eq!(request.user_agent(), "Test-Browser");
        assert_eq!(request.header("host"), Some("localhost:9999"));
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
        assert!(request.accept_encoding().contains(&HttpEncoding::Br));
        assert!(request.body().is_empty());
    }

    /// 验证 POST 请求体按 Content-Length 截取
    #[test]
    fn test_parse_post_request_body() {
        let request_str = "POST /login HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 23\r\n\r\nusername=tom&password=1extra";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Post);
        assert_eq!(request.content_length(), Some(23));
        assert_eq!(&request.body()[..], b"username=tom&password=1");
        assert_eq!(request.form_value("username"), Some("tom".to_string()));
        assert_eq!(request.form_value("password"), Some("1".to_string()));
    }

    #[test]
    fn test_parse_http_1_0() {
        let request = Request::try_from(b"GET / HTTP/1.0\r\n\r\n", 0).unwrap();
        assert_eq!(request.version(), HttpVersion::V1_0);
    }

    #[test]
    fn test_parse_delete_request() {
        let request = Request::try_from(b"DELETE /items/1 HTTP/1.1\r\nHost: x\r\n\r\n", 0).unwrap();
        assert_eq!(request.method(), HttpRequestMethod::Delete);
        assert_eq!(request.path(), "/items/1");
    }

    /// 确保不支持的 HTTP 方法会返回错误
    #[test]
    fn test_unsupported_method() {
        let result = Request::try_from(b"TRACE / HTTP/1.1\r\nHost: x\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::UnSupportedRequestMethod);
    }

    /// 确保不支持的版本（如 HTTP/2.0）被正确拒绝
    #[test]
    fn test_unsupported_http_version() {
        let result = Request::try_from(b"GET / HTTP/2.0\r\nHost: x\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::UnsupportedHttpVersion);
    }

    /// 验证 UTF-8 编码检查
    #[test]
    fn test_invalid_utf8() {
        let buffer = vec![0xFF, 0xFE, 0xFD];
        let result = Request::try_from(&buffer, 0);
        assert_eq!(result.unwrap_err(), Exception::RequestIsNotUtf8);
    }

    #[test]
    fn test_missing_terminator() {
        let result = Request::try_from(b"GET / HTTP/1.1\r\nHost: x\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    #[test]
    fn test_malformed_request_line() {
        let result = Request::try_from(b"GET /\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    #[test]
    fn test_malformed_header_line() {
        let result = Request::try_from(b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    /// 验证 Header 字段名是否大小写不敏感
    #[test]
    fn test_case_insensitive_headers() {
        let request_str = "GET / HTTP/1.1\r\nhost: localhost\r\nuser-agent: Test\r\naccept-encoding: gzip\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.user_agent(), "Test");
        assert_eq!(request.header("HOST"), Some("localhost"));
        assert_eq!(request.accept_encoding(), &[HttpEncoding::Gzip]);
    }

    /// 验证请求方法的小写兼容性处理
    #[test]
    fn test_lowercase_method() {
        let request = Request::try_from(b"get / HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(request.method(), HttpRequestMethod::Get);
    }

    #[test]
    fn test_query_decoding() {
        let request = Request::new(HttpRequestMethod::Get, "/search?q=hello+world&tag=a%26b&tag=c");

        assert_eq!(request.query_value("q"), Some("hello world".to_string()));
        assert_eq!(request.query_value("tag"), Some("a&b".to_string()));
        assert_eq!(request.query_value("missing"), None);
        assert_eq!(request.query_pairs().len(), 3);
    }

    #[test]
    fn test_form_value_prefers_body() {
        let request = Request::new(HttpRequestMethod::Post, "/login?username=query&lang=en")
            .with_header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .with_body("username=body");

        assert_eq!(request.form_value("username"), Some("body".to_string()));
        assert_eq!(request.form_value("lang"), Some("en".to_string()));
        assert_eq!(request.form_value("missing"), None);
    }

    #[test]
    fn test_form_ignored_for_get_and_other_types() {
        let get = Request::new(HttpRequestMethod::Get, "/")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("a=1");
        assert!(get.form_pairs().is_empty());

        let json = Request::new(HttpRequestMethod::Post, "/")
            .with_header("Content-Type", "application/json")
            .with_body("{\"a\":1}");
        assert!(json.form_pairs().is_empty());
    }

    #[test]
    fn test_path_is_percent_decoded() {
        let request = Request::try_from(b"GET /caf%C3%A9/a+b?x=%C3%A9 HTTP/1.1\r\nHost: x\r\n\r\n", 0).unwrap();

        assert_eq!(request.path(), "/café/a+b");
        assert_eq!(request.target(), "/caf%C3%A9/a+b?x=%C3%A9");
        assert_eq!(request.raw_query(), "x=%C3%A9");
        assert_eq!(request.query_value("x"), Some("é".to_string()));

        let built = Request::new(HttpRequestMethod::Get, "/users/%E5%BC%A0%E4%B8%89");
        assert_eq!(built.path(), "/users/张三");
    }

    #[test]
    fn test_path_with_invalid_utf8_escape() {
        let result = Request::try_from(b"GET /%FF%FE HTTP/1.1\r\nHost: x\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);

        // 直接构造时保留原始路径
        let built = Request::new(HttpRequestMethod::Get, "/%FF%FE");
        assert_eq!(built.path(), "/%FF%FE");
    }

    #[test]
    fn test_multipart_form_text_fields() {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            tom\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"bio\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            line one\r\nline two\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            \u{89}PNG\r\n\
            --XX--\r\n";
        let request = Request::new(HttpRequestMethod::Post, "/profile?name=query&lang=en")
            .with_header("Content-Type", "multipart/form-data; boundary=XX")
            .with_body(body);

        assert_eq!(
            request.form_pairs(),
            vec![
                ("name".to_string(), "tom".to_string()),
                ("bio".to_string(), "line one\r\nline two".to_string()),
            ]
        );
        assert_eq!(request.form_value("name"), Some("tom".to_string()));
        assert_eq!(request.form_value("avatar"), None);
        assert_eq!(request.form_value("lang"), Some("en".to_string()));
    }

    #[test]
    fn test_multipart_quoted_boundary_and_missing_boundary() {
        let body = "--a b\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nv\r\n--a b--\r\n";
        let quoted = Request::new(HttpRequestMethod::Post, "/")
            .with_header("Content-Type", "multipart/form-data; boundary=\"a b\"")
            .with_body(body);
        assert_eq!(quoted.form_value("k"), Some("v".to_string()));

        let missing = Request::new(HttpRequestMethod::Post, "/")
            .with_header("Content-Type", "multipart/form-data")
            .with_body(body);
        assert!(missing.form_pairs().is_empty());
    }

    #[test]
    fn test_header_helpers() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let end = find_header_end(raw).unwrap();
        assert_eq!(declared_content_length(&raw[..end]), 5);
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(declared_content_length(b"GET / HTTP/1.1\r\nHost: x"), 0);
    }
}
