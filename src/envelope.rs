// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 统一的 JSON 响应信封：`{"code":..,"message":..,"data":..}`。

use serde::ser::{Serialize, Serializer};
use serde_derive::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// 随手构造 JSON 对象时使用的映射类型。
pub type H = BTreeMap<String, Value>;

/// 信封中的业务码。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseCode {
    Ok = 200,
    Fail = 400,
}

impl ResponseCode {
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl Serialize for ResponseCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

/// 信封本体。字段顺序即输出顺序，`data` 为空时整个键被省略。
#[derive(Serialize)]
pub struct Envelope<'a, T: Serialize> {
    code: ResponseCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    pub fn success(data: T) -> Self {
        Self {
            code: ResponseCode::Ok,
            message: "success",
            data: Some(data),
        }
    }
}

impl<'a> Envelope<'a, ()> {
    pub fn failure(message: &'a str) -> Self {
        Self {
            code: ResponseCode::Fail,
            message,
            data: None,
        }
    }
}
