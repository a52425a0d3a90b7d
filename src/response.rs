// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::param::*;

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::{Bytes, BytesMut};
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};

use std::io::{self, Write};

/// 缓冲式响应写入器。
///
/// 上下文中的各个响应方法都写入这里，直到整条处理链结束后才由引擎序列化并发送，
/// 因此状态码和响应头在发送前都可以被覆盖。
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    body: BytesMut,
    date: DateTime<Utc>,
    server_name: String,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            body: BytesMut::new(),
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
        }
    }

    /// 设置状态行。
    pub fn write_header(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code);
        self
    }

    /// 追加响应体，返回写入的字节数。
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.body.extend_from_slice(data);
        data.len()
    }

    /// 设置响应头，已存在的同名头（大小写不敏感）会被替换。
    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
        self
    }

    pub fn del_header(&mut self, key: &str) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// 丢弃已缓冲的响应体。
    pub fn clear_body(&mut self) -> &mut Self {
        self.body.clear();
        self
    }

    /// 恢复到刚创建时的状态：200、无自定义头、空响应体。
    pub fn reset(&mut self) -> &mut Self {
        self.write_header(200);
        self.headers.clear();
        self.body.clear();
        self
    }

    /// 以纯文本错误信息替换当前响应。
    ///
    /// 已缓冲的内容会被丢弃，响应体为错误信息加换行。
    pub fn error(&mut self, message: &str, code: u16) -> &mut Self {
        self.body.clear();
        self.del_header("Content-Length");
        self.set_header("Content-Type", CONTENT_TYPE_TEXT);
        self.set_header("X-Content-Type-Options", "nosniff");
        self.write_header(code);
        self.write(message.as_bytes());
        self.write(b"\n");
        self
    }

    /// 序列化为完整的 HTTP 报文。
    ///
    /// * `encoding` - 与客户端协商出的压缩方式，`None` 表示不压缩。
    /// * `headonly` - HEAD 请求只发送头部，但保留真实的 `Content-Length`。
    pub fn as_bytes(&self, encoding: Option<HttpEncoding>, headonly: bool) -> Vec<u8> {
        let content_type = self.header("Content-Type").map(|t| t.to_string()).or_else(|| {
            match self.body.is_empty() {
                true => None,
                false => Some(CONTENT_TYPE_OCTET_STREAM.to_string()),
            }
        });

        let mut content_encoding = match (encoding, &content_type) {
            (Some(e), Some(t)) if !self.body.is_empty() && !should_skip_compression(t) => Some(e),
            _ => None,
        };
        let content = match compress(self.body.to_vec(), content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("压缩响应体失败: {}，返回未压缩内容", e);
                content_encoding = None;
                self.body.to_vec()
            }
        };

        let mut header = String::new();
        header.push_str(&format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        ));
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("Content-Type")
                || key.eq_ignore_ascii_case("Content-Length")
                || key.eq_ignore_ascii_case("Content-Encoding")
            {
                continue;
            }
            header.push_str(&[key.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        if let Some(t) = &content_type {
            header.push_str(&["Content-Type: ", t, CRLF].concat());
        }
        if let Some(e) = content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
            header.push_str(&["Vary: Accept-Encoding", CRLF].concat());
        }
        header.push_str(&format!("Content-Length: {}{}", content.len(), CRLF));
        header.push_str(&["Date: ", &format_date(&self.date), CRLF].concat());
        header.push_str(&["Server: ", &self.server_name, CRLF].concat());
        header.push_str(CRLF);

        match headonly {
            true => header.into_bytes(),
            false => [header.as_bytes(), &content].concat(),
        }
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Bytes {
        self.body.clone().freeze()
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => return Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/",
        "video/",
        "audio/",
        "application/zip",
        "application/x-rar",
        "application/x-7z-compressed",
        "application/gzip",
        "application/x-gzip",
        "font/woff",
        "font/woff2",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

/// 根据客户端声明的编码列表选择压缩方式，优先 gzip，其次 deflate，最后 br。
pub fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else if accept_encoding.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(writer: &ResponseWriter) -> String {
        String::from_utf8_lossy(&writer.as_bytes(None, false)).to_string()
    }

    #[test]
    fn test_format_date() {
        let formatted = format_date(&Utc::now());
        assert!(formatted.contains("+0000") || formatted.contains("GMT"));
    }

    #[test]
    fn test_compress_none() {
        let data = b"Hello, World!".to_vec();
        assert_eq!(compress(data.clone(), None).unwrap(), data);
    }

    #[test]
    fn test_compress_gzip() {
        let data = b"Hello, World! This is a test string for compression.".to_vec();
        let result = compress(data.clone(), Some(HttpEncoding::Gzip)).unwrap();

        assert_ne!(result, data);
        assert_eq!(&result[0..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_compress_large_data() {
        let data = vec![b'A'; 10000];
        let result_gzip = compress(data.clone(), Some(HttpEncoding::Gzip)).unwrap();
        let result_deflate = compress(data.clone(), Some(HttpEncoding::Deflate)).unwrap();
        let result_br = compress(data.clone(), Some(HttpEncoding::Br)).unwrap();

        assert!(result_gzip.len() < data.len());
        assert!(result_deflate.len() < data.len());
        assert!(result_br.len() < data.len());
    }

    #[test]
    fn test_decide_encoding() {
        assert_eq!(
            decide_encoding(&[HttpEncoding::Br, HttpEncoding::Gzip]),
            Some(HttpEncoding::Gzip)
        );
        assert_eq!(
            decide_encoding(&[HttpEncoding::Deflate]),
            Some(HttpEncoding::Deflate)
        );
        assert_eq!(decide_encoding(&[HttpEncoding::Br]), Some(HttpEncoding::Br));
        assert_eq!(decide_encoding(&[]), None);
    }

    #[test]
    fn test_skip_compression() {
        assert!(should_skip_compression("image/png"));
        assert!(should_skip_compression("application/zip"));
        assert!(!should_skip_compression(CONTENT_TYPE_JSON));
        assert!(!should_skip_compression(CONTENT_TYPE_HTML));
    }

    #[test]
    fn test_writer_new() {
        let writer = ResponseWriter::new();
        assert_eq!(writer.status_code(), 200);
        assert_eq!(writer.information(), "OK");
        assert!(writer.body().is_empty());
    }

    #[test]
    fn test_as_bytes_basic() {
        let response_str = render(&ResponseWriter::new());

        assert!(response_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response_str.contains("Content-Length: 0"));
        assert!(response_str.contains("Server: trellis"));
        assert!(response_str.contains("Date: "));
        assert!(!response_str.contains("Content-Type"));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_as_bytes_with_content() {
        let mut writer = ResponseWriter::new();
        writer.set_header("Content-Type", "text/plain");
        writer.write(b"Hello");
        let response_str = render(&writer);

        assert!(response_str.contains("Content-Type: text/plain\r\n"));
        assert!(response_str.contains("Content-Length: 5\r\n"));
        assert!(response_str.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_as_bytes_defaults_octet_stream() {
        let mut writer = ResponseWriter::new();
        writer.write(&[0u8, 1, 2]);
        assert!(render(&writer).contains("Content-Type: application/octet-stream"));
    }

    #[test]
    fn test_as_bytes_head_only() {
        let mut writer = ResponseWriter::new();
        writer.write(b"Hello");
        let response_str = String::from_utf8_lossy(&writer.as_bytes(None, true)).to_string();

        assert!(response_str.contains("Content-Length: 5"));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_as_bytes_gzip() {
        let mut writer = ResponseWriter::new();
        writer.set_header("Content-Type", CONTENT_TYPE_TEXT);
        writer.write(&vec![b'a'; 1000]);
        let bytes = writer.as_bytes(Some(HttpEncoding::Gzip), false);
        let response_str = String::from_utf8_lossy(&bytes);

        assert!(response_str.contains("Content-Encoding: gzip"));
        assert!(response_str.contains("Vary: Accept-Encoding"));
        assert!(bytes.len() < 1000);
    }

    #[test]
    fn test_as_bytes_skips_compressed_media() {
        let mut writer = ResponseWriter::new();
        writer.set_header("Content-Type", "image/png");
        writer.write(&vec![b'a'; 100]);
        let bytes = writer.as_bytes(Some(HttpEncoding::Gzip), false);

        assert!(!String::from_utf8_lossy(&bytes).contains("Content-Encoding"));
    }

    #[test]
    fn test_status_code_various() {
        for (code, expected_info) in [
            (200, "OK"),
            (201, "Created"),
            (204, "No Content"),
            (400, "Bad Request"),
            (404, "Not Found"),
            (500, "Internal Server Error"),
            (299, "status code 299"),
        ] {
            let mut writer = ResponseWriter::new();
            writer.write_header(code);
            assert_eq!(writer.status_code(), code);
            assert_eq!(writer.information(), expected_info);
        }
    }

    #[test]
    fn test_set_header_replaces() {
        let mut writer = ResponseWriter::new();
        writer.set_header("X-Trace", "a");
        writer.set_header("x-trace", "b");

        assert_eq!(writer.headers().len(), 1);
        assert_eq!(writer.header("X-TRACE"), Some("b"));

        writer.del_header("X-Trace");
        assert_eq!(writer.header("X-Trace"), None);
    }

    #[test]
    fn test_error_replaces_body() {
        let mut writer = ResponseWriter::new();
        writer.set_header("Content-Type", CONTENT_TYPE_JSON);
        writer.write(b"{\"partial\":");
        writer.error("boom", 500);

        assert_eq!(writer.status_code(), 500);
        assert_eq!(writer.body_str(), "boom\n");
        assert_eq!(writer.header("Content-Type"), Some(CONTENT_TYPE_TEXT));
        assert_eq!(writer.header("X-Content-Type-Options"), Some("nosniff"));
    }

    #[test]
    fn test_reset() {
        let mut writer = ResponseWriter::new();
        writer.write_header(418).set_header("A", "b");
        writer.write(b"tea");
        writer.reset();

        assert_eq!(writer.status_code(), 200);
        assert!(writer.headers().is_empty());
        assert!(writer.body().is_empty());
    }
}
