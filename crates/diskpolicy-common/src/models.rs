//! 数据模型模块
//!
//! 该模块定义了 DiskPolicy 项目中使用的核心数据模型，包括协调目标、
//! 磁盘解析结果和快照策略。

pub mod disk;
