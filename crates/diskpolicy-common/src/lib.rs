//! DiskPolicy Common - 跨模块共享的数据模型与错误类型
//!
//! 该模块提供 DiskPolicy 项目中所有组件共享的数据结构和统一的错误处理机制，
//! 包括协调目标、磁盘位置、快照策略等模型。

pub mod models;
pub mod error;

/// 重新导出常用类型，方便使用
pub use error::Error;
pub use error::Result;
pub use models::disk::*;
