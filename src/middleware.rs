// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::context::{Context, HandlerFunc};

use log::{error, info};

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

/// 访问日志：整条处理链结束后记录请求序号、方法、目标、状态码与耗时。
pub fn logger() -> HandlerFunc {
    Arc::new(|c: &mut Context| {
        let start_time = Instant::now();
        c.next();
        info!(
            "[ID{}] {}, {}, {}, {}, {}ms",
            c.id(),
            c.method(),
            c.request().target(),
            c.writer().status_code(),
            c.writer().information(),
            start_time.elapsed().as_millis()
        );
    })
}

/// 捕获后续处理函数中的 panic，丢弃已写入的内容并返回 500。
pub fn recovery() -> HandlerFunc {
    Arc::new(|c: &mut Context| {
        let result = catch_unwind(AssertUnwindSafe(|| c.next()));
        if let Err(payload) = result {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("[ID{}]处理函数发生panic：{}", c.id(), reason);
            c.writer_mut().reset();
            c.string(500, format_args!("Internal Server Error"));
            c.abort();
        }
    })
}
