//! Coordination key space
//!
//! Every durable record is namespaced by cluster name under a single system
//! root, so several clusters can share one etcd installation.

const ROOT: &str = "/hive/clusters";

pub(crate) fn member_info(cluster: &str, member_id: &str) -> String {
    format!("{}/{}/members/{}", ROOT, cluster, member_id)
}

pub(crate) fn heartbeat_prefix(cluster: &str) -> String {
    format!("{}/{}/heartbeat/", ROOT, cluster)
}

pub(crate) fn heartbeat(cluster: &str, member_id: &str) -> String {
    format!("{}{}", heartbeat_prefix(cluster), member_id)
}

pub(crate) fn leader(cluster: &str) -> String {
    format!("{}/{}/leader", ROOT, cluster)
}

pub(crate) fn jobs_prefix(cluster: &str) -> String {
    format!("{}/{}/jobs/", ROOT, cluster)
}

pub(crate) fn job(cluster: &str, job_id: &str) -> String {
    format!("{}{}", jobs_prefix(cluster), job_id)
}

pub(crate) fn assignments_prefix(cluster: &str) -> String {
    format!("{}/{}/assignments/", ROOT, cluster)
}

pub(crate) fn assignment(cluster: &str, member_id: &str) -> String {
    format!("{}{}", assignments_prefix(cluster), member_id)
}

pub(crate) fn checkpoint(cluster: &str, worker_id: &str) -> String {
    format!("{}/{}/checkpoints/{}", ROOT, cluster, worker_id)
}

pub(crate) fn data_prefix(cluster: &str, worker_id: &str) -> String {
    format!("{}/{}/data/{}/", ROOT, cluster, worker_id)
}

pub(crate) fn data(cluster: &str, worker_id: &str, row_id: &str) -> String {
    format!("{}{}", data_prefix(cluster, worker_id), row_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced_by_cluster() {
        assert_eq!(heartbeat("c1", "m1"), "/hive/clusters/c1/heartbeat/m1");
        assert!(job("c1", "j1").starts_with(&jobs_prefix("c1")));
        assert!(data("c1", "w1", "r1").starts_with(&data_prefix("c1", "w1")));
        assert_ne!(leader("c1"), leader("c2"));
    }
}
