use crate::param::reason_phrase;

use std::fmt::Write;

/// 框架自带的状态页，用于 404、400、413 等不经过处理函数的响应。
pub struct StatusPage {
    code: u16,
    reason: String,
    detail: Option<String>,
}

impl StatusPage {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            reason: reason_phrase(code),
            detail: None,
        }
    }

    /// 附加一行说明。内容按原样嵌入页面，调用方负责转义。
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn render(&self) -> String {
        let mut page = String::with_capacity(256);
        page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(page, "<title>{} {}</title>", self.code, self.reason);
        page.push_str("</head>\n<body>\n");
        let _ = writeln!(page, "<h1>{} {}</h1>", self.code, self.reason);
        if let Some(detail) = &self.detail {
            let _ = writeln!(page, "<p>{}</p>", detail);
        }
        let _ = writeln!(page, "<hr>\n<address>{}</address>", crate::param::SERVER_NAME);
        page.push_str("</body>\n</html>\n");
        page
    }
}

/// 转义 HTML 特殊字符，输出与 Go html/template 的转义结果一致。
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
