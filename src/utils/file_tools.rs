//! 文件工具模块
//!
//! 提供持久化文件所需的目录管理与删除工具。

use crate::error::{LogConsoleError, Result};
use std::fs;
use std::path::Path;

/// 文件工具结构体
///
/// 提供各种文件操作的静态方法
pub struct FileTools;

impl FileTools {
    /// 确保目录存在，如果不存在则创建
    ///
    /// 空路径（相对文件名的父目录）视为当前目录。
    pub fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| LogConsoleError::IoError { source: e })?
        } else if !path.is_dir() {
            return Err(LogConsoleError::IoError {
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("路径存在但不是目录: {}", path.display()),
                ),
            });
        }

        Ok(())
    }

    /// 删除文件，文件不存在时视为成功
    pub async fn remove_file_if_exists<P: AsRef<Path>>(file_path: P) -> Result<()> {
        match tokio::fs::remove_file(file_path.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LogConsoleError::IoError { source: e }),
        }
    }
}
