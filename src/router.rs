// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 路由解析接口。
//!
//! 路由匹配本身不属于框架核心：引擎只通过 `Router` 询问“这个请求由哪些处理函数处理、
//! 路径参数是什么”。`StaticRouter` 是最简单的实现，只做方法加路径的精确匹配。

use crate::{context::HandlerFunc, param::HttpRequestMethod};

use log::debug;

use std::collections::HashMap;

/// 一次路由解析的结果。
pub struct Route {
    pub handlers: Vec<HandlerFunc>,
    pub params: HashMap<String, String>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Router: Send + Sync {
    fn resolve(&self, method: HttpRequestMethod, path: &str) -> Option<Route>;
}

#[derive(Default)]
pub struct StaticRouter {
    routes: HashMap<(HttpRequestMethod, String), Vec<HandlerFunc>>,
}

impl StaticRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由，同一方法与路径重复注册时后者覆盖前者。
    pub fn add_route(
        &mut self,
        method: HttpRequestMethod,
        path: &str,
        handlers: Vec<HandlerFunc>,
    ) -> &mut Self {
        debug!("注册路由：{} {}", method, path);
        self.routes.insert((method, path.to_string()), handlers);
        self
    }

    pub fn get(&mut self, path: &str, handler: HandlerFunc) -> &mut Self {
        self.add_route(HttpRequestMethod::Get, path, vec![handler])
    }

    pub fn post(&mut self, path: &str, handler: HandlerFunc) -> &mut Self {
        self.add_route(HttpRequestMethod::Post, path, vec![handler])
    }
}

impl Router for StaticRouter {
    fn resolve(&self, method: HttpRequestMethod, path: &str) -> Option<Route> {
        self.routes
            .get(&(method, path.to_string()))
            .map(|handlers| Route {
                handlers: handlers.clone(),
                params: HashMap::new(),
            })
    }
}
