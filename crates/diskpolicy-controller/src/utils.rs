//! 控制器工具函数

use url::Url;

/// 取 GCE 资源 URL 路径的最后一段
///
/// 同时接受完整 URL 和相对资源路径，例如
/// `https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a` => `us-central1-a`，
/// `projects/p/zones/z/disks/disk-1` => `disk-1`。
pub fn last_path_segment(resource: &str) -> Option<String> {
    let path = match Url::parse(resource) {
        Ok(url) => url.path().to_string(),
        // 相对路径，去掉查询串和片段
        Err(_) => resource.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
