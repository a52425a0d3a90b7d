// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求上下文模块
//!
//! `Context` 在一次请求的整个生命周期内存在：由引擎在收到请求时创建，
//! 交给中间件与路由处理函数依次修改，响应写出后即被丢弃。它负责：
//! 1. 暴露请求信息：路径参数、查询参数、表单参数。
//! 2. 提供响应写入器：纯文本、JSON、原始字节、HTML 模板，以及 `ok`/`fail` 两种 JSON 信封。
//! 3. 通过游标 `index` 驱动线性的处理链（`next`）。
//!
//! ## 处理链语义
//! 游标只增不减。`next` 从游标处开始依次执行剩余的处理函数，每个函数至多执行一次；
//! 处理函数内部调用 `next` 时，后续函数会在该函数返回之前全部执行完毕，
//! 从而实现“前置逻辑 - 后续链 - 后置逻辑”的洋葱模型。
//! 处理链已执行完时再次调用 `next` 不做任何事。

use crate::{
    envelope::Envelope,
    exception::Exception,
    param::*,
    request::Request,
    response::ResponseWriter,
    template::HtmlTemplates,
};

use log::{debug, error, warn};
use serde::ser::Serialize;

use std::{collections::HashMap, fmt, sync::Arc};

/// 处理函数。处理函数在多个并发请求之间共享，每个请求拥有自己的 `Context`。
pub type HandlerFunc = Arc<dyn Fn(&mut Context) + Send + Sync>;

pub struct Context {
    request: Request,
    writer: ResponseWriter,
    path: String,
    method: HttpRequestMethod,
    /// 由外部路由解析出的路径参数
    params: HashMap<String, String>,
    /// 最近一次 `status` 记录的状态码，未设置时为 0
    status_code: u16,
    handlers: Vec<HandlerFunc>,
    /// 下一个待执行处理函数的下标
    index: usize,
    aborted: bool,
    templates: Option<Arc<HtmlTemplates>>,
    id: u128,
}

impl Context {
    pub fn new(request: Request, id: u128) -> Self {
        Self {
            path: request.path().to_string(),
            method: request.method(),
            request,
            writer: ResponseWriter::new(),
            params: HashMap::new(),
            status_code: 0,
            handlers: Vec::new(),
            index: 0,
            aborted: false,
            templates: None,
            id,
        }
    }

    pub fn with_templates(mut self, templates: Arc<HtmlTemplates>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// 替换处理链并把游标移回起点。
    pub fn set_handlers(&mut self, handlers: Vec<HandlerFunc>) {
        self.handlers = handlers;
        self.index = 0;
        self.aborted = false;
    }

    /// 依次执行游标之后的全部处理函数。
    pub fn next(&mut self) {
        while self.index < self.handlers.len() {
            let handler = Arc::clone(&self.handlers[self.index]);
            self.index += 1;
            handler(self);
        }
    }

    /// 跳过处理链中尚未执行的处理函数。
    pub fn abort(&mut self) {
        debug!(
            "[ID{}]处理链在第{}/{}个处理函数处中止",
            self.id,
            self.index,
            self.handlers.len()
        );
        self.index = self.handlers.len();
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

// --- 请求信息 ---

impl Context {
    /// 路径参数，不存在时为空串。
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }

    /// 表单参数，请求体优先，其次是查询串；不存在时为空串。
    pub fn post_form(&self, key: &str) -> String {
        self.request.form_value(key).unwrap_or_default()
    }

    /// 查询参数，不存在时为空串。
    pub fn query(&self, key: &str) -> String {
        self.request.query_value(key).unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn id(&self) -> u128 {
        self.id
    }
}

// --- 响应写入 ---

impl Context {
    /// 同时记录状态码并写入响应状态行。
    ///
    /// 状态码必须是三位数（100-999），否则按 500 处理。
    pub fn status(&mut self, code: u16) {
        let code = match code {
            100..=999 => code,
            _ => {
                warn!("[ID{}]非法的HTTP状态码{}，改为500", self.id, code);
                500
            }
        };
        self.status_code = code;
        self.writer.write_header(code);
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.writer.set_header(key, value);
    }

    /// 纯文本响应，用法：`c.string(200, format_args!("hello {}", name))`。
    pub fn string(&mut self, code: u16, args: fmt::Arguments<'_>) {
        self.set_header("Content-Type", CONTENT_TYPE_TEXT);
        self.status(code);
        self.writer.write(fmt::format(args).as_bytes());
    }

    /// JSON 响应。编码失败时改为 500 纯文本错误响应。
    ///
    /// 字符串中的 `<`、`>`、`&` 以及 U+2028、U+2029 输出为 `\uXXXX` 形式，
    /// 使响应可以安全地嵌入 HTML。
    pub fn json<T: Serialize + ?Sized>(&mut self, code: u16, obj: &T) {
        match serde_json::to_vec(obj) {
            Ok(body) => {
                self.set_header("Content-Type", CONTENT_TYPE_JSON);
                self.status(code);
                self.writer.write(&escape_json_html(&body));
            }
            Err(e) => {
                let e = Exception::JsonEncode(e.to_string());
                error!("[ID{}]JSON编码失败：{}", self.id, e);
                self.status_code = 500;
                self.writer.error(&e.to_string(), 500);
            }
        }
    }

    /// 原始字节响应，不设置内容类型。
    pub fn data(&mut self, code: u16, data: impl AsRef<[u8]>) {
        self.status(code);
        self.writer.write(data.as_ref());
    }

    /// 成功信封：`{"code":200,"message":"success","data":...}`，HTTP 状态码恒为 200。
    pub fn ok<T: Serialize>(&mut self, data: T) {
        self.json(200, &Envelope::success(data));
    }

    /// 失败信封：`{"code":400,"message":...}`，HTTP 状态码恒为 200。
    pub fn fail(&mut self, message: &str) {
        self.json(200, &Envelope::failure(message));
    }

    /// 执行具名模板并写出 HTML。
    ///
    /// 模板不存在或执行失败时，丢弃已写入的内容，改为写出以错误信息为内容的失败信封。
    pub fn html<T: Serialize>(&mut self, code: u16, name: &str, data: &T) {
        self.set_header("Content-Type", CONTENT_TYPE_HTML);
        self.status(code);
        let rendered = match &self.templates {
            Some(templates) => templates.execute(name, data),
            None => Err(Exception::TemplateNotFound(name.to_string())),
        };
        match rendered {
            Ok(html) => {
                self.writer.write(html.as_bytes());
            }
            Err(e) => {
                error!("[ID{}]模板{}渲染失败：{}", self.id, name, e);
                self.writer.clear_body();
                self.fail(&e.to_string());
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// 结束上下文，取出写入器交给引擎发送。
    pub fn into_writer(self) -> ResponseWriter {
        self.writer
    }
}

/// 转义已编码 JSON 中对 HTML 不安全的字符。
///
/// 这些字符在合法 JSON 中只会出现在字符串内部，因此可以直接按字节替换。
fn escape_json_html(json: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(json.len());
    let mut i = 0;
    while i < json.len() {
        match json[i] {
            b'<' => escaped.extend_from_slice(b"\\u003c"),
            b'>' => escaped.extend_from_slice(b"\\u003e"),
            b'&' => escaped.extend_from_slice(b"\\u0026"),
            // U+2028 / U+2029 的 UTF-8 编码为 E2 80 A8 / E2 80 A9
            0xE2 if json.get(i + 1).copied() == Some(0x80)
                && matches!(json.get(i + 2).copied(), Some(0xA8) | Some(0xA9)) =>
            {
                let tail = match json[i + 2] {
                    0xA8 => b"\\u2028",
                    _ => b"\\u2029",
                };
                escaped.extend_from_slice(tail);
                i += 3;
                continue;
            }
            byte => escaped.push(byte),
        }
        i += 1;
    }
    escaped
}
