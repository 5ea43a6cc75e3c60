//! Console resource registry client: clusters, nodes, namespaces and
//! the install-time config snapshot all live behind one API.

use async_trait::async_trait;
use serde_json::json;

use clusterops_domain::{
    ClusterRecord, ClusterRegistry, ClusterStatus, ConfigSnapshot, NodeRecord, NodeStatus,
    NodeStatusUpdate, OpsResult,
};

use super::{
    build_http_client, check_ack, delete_envelope, get_envelope, optional_data, post_envelope,
    put_envelope,
};

pub struct HttpClusterRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpClusterRegistry {
    pub fn new(base_url: &str, timeout_seconds: u64) -> OpsResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http_client(timeout_seconds)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ClusterRegistry for HttpClusterRegistry {
    async fn create_cluster(&self, cluster: &ClusterRecord) -> OpsResult<ClusterRecord> {
        post_envelope(&self.http, &self.url("/api/v1/clusters"), cluster, "创建集群")
            .await?
            .into_data("创建集群")
    }

    async fn get_cluster(&self, cluster_id: &str) -> OpsResult<Option<ClusterRecord>> {
        let envelope = get_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}")),
            "查询集群",
        )
        .await?;
        optional_data(envelope, "查询集群")
    }

    async fn update_cluster_status(
        &self,
        cluster_id: &str,
        expect: Option<ClusterStatus>,
        next: ClusterStatus,
    ) -> OpsResult<bool> {
        put_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/status")),
            &json!({ "expect": expect, "next": next }),
            "更新集群状态",
        )
        .await?
        .into_data("更新集群状态")
    }

    async fn delete_cluster(&self, cluster_id: &str) -> OpsResult<()> {
        let envelope = delete_envelope::<serde_json::Value, serde_json::Value>(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}")),
            None,
            "删除集群记录",
        )
        .await?;
        check_ack(envelope, "删除集群记录")
    }

    async fn get_master_nodes(&self, cluster_id: &str) -> OpsResult<Vec<NodeRecord>> {
        let envelope = get_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/master_nodes")),
            "查询master节点",
        )
        .await?;
        Ok(optional_data(envelope, "查询master节点")?.unwrap_or_default())
    }

    async fn get_cluster_nodes(&self, cluster_id: &str) -> OpsResult<Vec<NodeRecord>> {
        let envelope = get_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/nodes")),
            "查询集群节点",
        )
        .await?;
        Ok(optional_data(envelope, "查询集群节点")?.unwrap_or_default())
    }

    async fn find_nodes_by_ips(&self, ips: &[String]) -> OpsResult<Vec<NodeRecord>> {
        let envelope = post_envelope(
            &self.http,
            &self.url("/api/v1/nodes/query"),
            &json!({ "inner_ips": ips }),
            "按IP检索节点",
        )
        .await?;
        Ok(optional_data(envelope, "按IP检索节点")?.unwrap_or_default())
    }

    async fn create_nodes(
        &self,
        cluster_id: &str,
        ips: &[String],
        status: NodeStatus,
    ) -> OpsResult<Vec<NodeRecord>> {
        post_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/nodes")),
            &json!({ "inner_ips": ips, "status": status }),
            "创建节点记录",
        )
        .await?
        .into_data("创建节点记录")
    }

    async fn update_node_list(
        &self,
        cluster_id: &str,
        updates: &[NodeStatusUpdate],
    ) -> OpsResult<()> {
        let envelope = put_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/nodes")),
            &json!({ "updates": updates }),
            "更新节点状态",
        )
        .await?;
        check_ack(envelope, "更新节点状态")
    }

    async fn delete_node_labels(&self, cluster_id: &str, ips: &[String]) -> OpsResult<()> {
        let envelope = delete_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/node_labels")),
            Some(&json!({ "inner_ips": ips })),
            "删除节点标签",
        )
        .await?;
        check_ack(envelope, "删除节点标签")
    }

    async fn get_cluster_namespaces(&self, cluster_id: &str) -> OpsResult<Vec<String>> {
        let envelope = get_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/namespaces")),
            "查询集群命名空间",
        )
        .await?;
        Ok(optional_data(envelope, "查询集群命名空间")?.unwrap_or_default())
    }

    async fn delete_cluster_namespaces(&self, cluster_id: &str) -> OpsResult<()> {
        let envelope = delete_envelope::<serde_json::Value, serde_json::Value>(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/namespaces")),
            None,
            "删除集群命名空间",
        )
        .await?;
        check_ack(envelope, "删除集群命名空间")
    }

    async fn save_snapshot(&self, snapshot: &ConfigSnapshot) -> OpsResult<()> {
        let envelope = put_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{}/snapshot", snapshot.cluster_id)),
            snapshot,
            "保存配置快照",
        )
        .await?;
        check_ack(envelope, "保存配置快照")
    }

    async fn get_snapshot(&self, cluster_id: &str) -> OpsResult<Option<ConfigSnapshot>> {
        let envelope = get_envelope(
            &self.http,
            &self.url(&format!("/api/v1/clusters/{cluster_id}/snapshot")),
            "读取配置快照",
        )
        .await?;
        optional_data(envelope, "读取配置快照")
    }
}
