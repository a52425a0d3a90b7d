// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 示例服务
//!
//! 演示如何把 `trellis` 的各个部件组装成一个可运行的服务：
//! - 通过 log4rs 初始化日志，通过 TOML 文件加载运行参数；
//! - 从模板目录载入 HTML 模板；
//! - 以 `StaticRouter` 注册若干路由，覆盖纯文本、JSON、表单、信封和模板响应；
//! - 在多线程 Tokio 运行时上启动监听循环，Ctrl-C 退出。

use trellis::{Config, Context, Engine, HandlerFunc, StaticRouter, H};

use log::{error, info, warn};
use serde_json::json;
use tokio::runtime::Builder;

use std::{path::Path, process::ExitCode, sync::Arc};

fn main() -> ExitCode {
    // 1. 初始化日志系统：通过外部 YAML 灵活配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 环境配置加载：从 TOML 文件读取运行参数
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            warn!("{}，使用默认配置", e);
            Config::new()
        }
    };
    info!("配置文件已载入");

    // 3. 组装引擎：默认中间件 + 路由 + 模板
    let mut engine = Engine::with_defaults(routes());
    if let Err(e) = engine.load_templates(
        Path::new(config.template_dir()),
        config.template_extension(),
    ) {
        warn!("{}。服务器将继续运行，但模板页面将返回失败信封。", e);
    }

    // 4. 异步运行时定制：根据配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(Arc::new(engine).serve(Arc::new(config))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("服务异常退出：{}", e);
            ExitCode::FAILURE
        }
    }
}

fn routes() -> StaticRouter {
    let mut router = StaticRouter::new();
    router
        .get("/", handler(|c| c.html(200, "index.tmpl", &json!({"title": "trellis"}))))
        .get(
            "/hello",
            handler(|c| {
                let name = c.query("name");
                let path = c.path().to_string();
                c.string(200, format_args!("hello {}, you're at {}\n", name, path));
            }),
        )
        .post(
            "/login",
            handler(|c| {
                let username = c.post_form("username");
                if username.is_empty() {
                    c.fail("username is required");
                    return;
                }
                let mut data = H::new();
                data.insert("username".to_string(), json!(username));
                c.ok(data);
            }),
        )
        .get(
            "/assets/ping.txt",
            handler(|c| {
                c.set_header("Content-Type", "text/plain");
                c.data(200, b"pong".to_vec());
            }),
        );
    router
}

fn handler(f: impl Fn(&mut Context) + Send + Sync + 'static) -> HandlerFunc {
    Arc::new(f)
}
