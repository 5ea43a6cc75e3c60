//! 主机命名
//!
//! 纯函数，无IO。集群ID嵌入主机名，两个集群共用同一IP时
//! 命名也不会冲突；master与普通节点使用不同前缀。

/// `(ip, cluster_id, is_master) -> hostname`
///
/// 例: `node_name("10.0.0.1", "BCS-K8S-40000", true)`
/// -> `"master-10-0-0-1-bcs-k8s-40000"`
pub fn node_name(ip: &str, cluster_id: &str, is_master: bool) -> String {
    let role = if is_master { "master" } else { "node" };
    let ip_part = ip.replace('.', "-");
    let cluster_part = cluster_id.to_lowercase().replace('.', "-");
    format!("{role}-{ip_part}-{cluster_part}")
}

/// 按IP列表批量命名，返回 `hostname -> ip` 映射（保持插入序）
pub fn name_hosts(ips: &[String], cluster_id: &str, is_master: bool) -> Vec<(String, String)> {
    ips.iter()
        .map(|ip| (node_name(ip, cluster_id, is_master), ip.clone()))
        .collect()
}
