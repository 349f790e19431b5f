//! 远程日志查询 MCP 工具核心库
//! 方言识别、查询上下文、带重试的远程执行与面向 AI 的结果规范化。

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod mcp;
pub mod model;
pub mod normalizer;
pub mod query;
pub mod schema;
pub mod search;
