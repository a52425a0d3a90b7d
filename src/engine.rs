// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 引擎模块
//!
//! 引擎把各部分组装起来：
//! - 全局中间件列表，按注册顺序排在每条处理链的最前面；
//! - 外部路由（`Router`），给出路由处理函数与路径参数；
//! - 全部请求共享的只读 HTML 模板集合。
//!
//! `handle` 只负责“请求进、响应出”，不涉及网络；`serve_listener` 则是基于 Tokio 的
//! 最小连接循环：每个连接读取一个请求、写回一个响应后关闭。

use crate::{
    config::Config,
    context::{Context, HandlerFunc},
    exception::Exception,
    param::*,
    request::{declared_content_length, find_header_end, Request},
    response::{decide_encoding, ResponseWriter},
    router::Router,
    template::HtmlTemplates,
    util::{escape_html, StatusPage},
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    path::Path,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Instant,
};

/// 每次从 Socket 读取的块大小
const READ_CHUNK_SIZE: usize = 4096;

pub struct Engine {
    middlewares: Vec<HandlerFunc>,
    router: Box<dyn Router>,
    templates: Arc<HtmlTemplates>,
}

impl Engine {
    pub fn new(router: impl Router + 'static) -> Self {
        Self {
            middlewares: Vec::new(),
            router: Box::new(router),
            templates: Arc::new(HtmlTemplates::new()),
        }
    }

    /// 预置了访问日志与 panic 恢复中间件的引擎。
    pub fn with_defaults(router: impl Router + 'static) -> Self {
        let mut engine = Self::new(router);
        engine
            .use_middleware(crate::middleware::logger())
            .use_middleware(crate::middleware::recovery());
        engine
    }

    pub fn use_middleware(&mut self, handler: HandlerFunc) -> &mut Self {
        self.middlewares.push(handler);
        self
    }

    pub fn set_templates(&mut self, templates: HtmlTemplates) -> &mut Self {
        self.templates = Arc::new(templates);
        self
    }

    /// 从目录加载模板，替换当前模板集合。
    pub fn load_templates(&mut self, dir: &Path, extension: &str) -> Result<&mut Self, Exception> {
        let templates = HtmlTemplates::load_dir(dir, extension)?;
        Ok(self.set_templates(templates))
    }

    pub fn templates(&self) -> &HtmlTemplates {
        &self.templates
    }

    /// 处理一个已解析的请求，返回缓冲好的响应。
    pub fn handle(&self, request: Request, id: u128) -> ResponseWriter {
        let mut context = Context::new(request, id).with_templates(Arc::clone(&self.templates));
        let mut handlers = self.middlewares.clone();
        match self.router.resolve(context.method(), context.path()) {
            Some(route) => {
                debug!("[ID{}]路由命中：{} {}", id, context.method(), context.path());
                context.set_params(route.params);
                handlers.extend(route.handlers);
            }
            None => {
                warn!("[ID{}]未找到路由：{} {}", id, context.method(), context.path());
                handlers.push(Arc::new(not_found));
            }
        }
        context.set_handlers(handlers);
        context.next();
        context.into_writer()
    }

    /// 监听配置指定的地址，直到收到 Ctrl-C。
    pub async fn serve(self: Arc<Self>, config: Arc<Config>) -> std::io::Result<()> {
        let address = match config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        let socket = SocketAddrV4::new(address, config.port());
        let listener = match TcpListener::bind(socket).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("无法绑定地址：{}，错误：{}", socket, e);
                return Err(e);
            }
        };
        info!("服务端在{}上监听Socket连接", socket);

        tokio::select! {
            result = self.serve_listener(listener, config) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("接收到停机信号，正在退出...");
                Ok(())
            }
        }
    }

    /// 在已绑定的监听器上循环接收连接，每个连接交给独立的任务处理。
    pub async fn serve_listener(
        self: Arc<Self>,
        listener: TcpListener,
        config: Arc<Config>,
    ) -> std::io::Result<()> {
        let active_connection = Arc::new(AtomicU32::new(0));
        let mut id: u128 = 0;
        loop {
            let (mut stream, addr) = listener.accept().await?;
            debug!("[ID{}]新的连接：{}", id, addr);

            let engine = Arc::clone(&self);
            let config = Arc::clone(&config);
            let active_connection = Arc::clone(&active_connection);
            tokio::spawn(async move {
                let active = active_connection.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("[ID{}]当前活跃连接数：{}", id, active);
                engine.handle_connection(&mut stream, id, &config).await;
                active_connection.fetch_sub(1, Ordering::SeqCst);
            });
            id += 1;
        }
    }

    async fn handle_connection(&self, stream: &mut TcpStream, id: u128, config: &Config) {
        let start_time = Instant::now();

        let buffer = match read_request(stream, config.max_request_size()).await {
            Ok(Some(buffer)) => buffer,
            Ok(None) => return, // 客户端主动关闭连接
            Err(Exception::RequestTooLarge) => {
                warn!("[ID{}]请求超过{}字节，返回413", id, config.max_request_size());
                write_status_page(stream, 413).await;
                return;
            }
            Err(e) => {
                error!("[ID{}]读取请求失败：{}", id, e);
                return;
            }
        };

        let request = match Request::try_from(&buffer, id) {
            Ok(request) => request,
            Err(e) => {
                warn!("[ID{}]解析HTTP请求失败：{}，返回400", id, e);
                write_status_page(stream, 400).await;
                return;
            }
        };

        let headonly = request.method() == HttpRequestMethod::Head;
        let encoding = match config.enable_compression() {
            true => decide_encoding(request.accept_encoding()),
            false => None,
        };
        let writer = self.handle(request, id);
        let response_bytes = writer.as_bytes(encoding, headonly);

        debug!(
            "[ID{}]HTTP响应构建完成，服务端用时{}ms，长度: {}",
            id,
            start_time.elapsed().as_millis(),
            response_bytes.len()
        );
        if let Err(e) = stream.write_all(&response_bytes).await {
            error!("[ID{}]发送响应失败：{}", id, e);
            return;
        }
        let _ = stream.flush().await;
    }
}

fn not_found(c: &mut Context) {
    let page = StatusPage::new(404)
        .detail(format!("404 NOT FOUND: {}", escape_html(c.path())))
        .render();
    c.set_header("Content-Type", CONTENT_TYPE_HTML);
    c.data(404, page);
}

/// 读取一个完整请求：头部加上 `Content-Length` 声明的请求体。
///
/// 连接在发送任何数据前关闭时返回 `Ok(None)`。
async fn read_request(
    stream: &mut TcpStream,
    max_request_size: usize,
) -> Result<Option<Vec<u8>>, Exception> {
    let mut buffer = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| Exception::MalformedRequest)?;
        if n == 0 {
            return match buffer.is_empty() {
                true => Ok(None),
                false => Ok(Some(buffer)),
            };
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > max_request_size {
            return Err(Exception::RequestTooLarge);
        }

        if let Some(head_end) = find_header_end(&buffer) {
            // Content-Length 由客户端提供，可能接近 usize::MAX
            let declared = declared_content_length(&buffer[..head_end]);
            let expected = (head_end + 4).saturating_add(declared);
            if expected > max_request_size {
                return Err(Exception::RequestTooLarge);
            }
            if buffer.len() >= expected {
                return Ok(Some(buffer));
            }
        }
    }
}

async fn write_status_page(stream: &mut TcpStream, code: u16) {
    let mut writer = ResponseWriter::new();
    writer.write_header(code);
    writer.set_header("Content-Type", CONTENT_TYPE_HTML);
    writer.set_header("Connection", "close");
    writer.write(StatusPage::new(code).render().as_bytes());
    let _ = stream.write_all(&writer.as_bytes(None, false)).await;
    let _ = stream.flush().await;
}
