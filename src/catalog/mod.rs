//! Built-in check catalog
//!
//! The allowlisted monitoring queries this service is willing to run.
//! The catalog is static data: loaded once, ordered, keyed by id, and
//! immutable for the process lifetime.

use serde::Serialize;

/// How a check's query is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Range,
}

/// One allowlisted check: a named query template plus metadata
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    /// Stable unique id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    pub description: &'static str,
    /// Query template; may contain a `{range}` placeholder
    pub promql: &'static str,
    pub kind: CheckKind,
}

/// Check metadata echoed in results
#[derive(Debug, Clone, Serialize)]
pub struct CheckMeta {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&Check> for CheckMeta {
    fn from(check: &Check) -> Self {
        Self {
            id: check.id.to_string(),
            name: check.name.to_string(),
            description: check.description.to_string(),
        }
    }
}

/// Ordered, id-keyed collection of checks
#[derive(Debug, Clone)]
pub struct Catalog {
    checks: Vec<Check>,
}

impl Catalog {
    /// The built-in catalog, in definition order
    pub fn builtin() -> Self {
        Self {
            checks: builtin_checks(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

fn check(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    promql: &'static str,
) -> Check {
    Check {
        id,
        name,
        description,
        promql,
        kind: CheckKind::Range,
    }
}

fn builtin_checks() -> Vec<Check> {
    vec![
        check(
            "cpu_avg_pct",
            "CPU Average Usage (%)",
            "CPU usage trend by instance/server_name.",
            r#"100 - (avg by (instance,server_name) (rate(node_cpu_seconds_total{mode="idle"}[5m])) * 100)"#,
        ),
        check(
            "cpu_peak_pct",
            "CPU Peak Usage (%)",
            "Window peak CPU usage over selected range.",
            r#"max_over_time((100 - (avg by (instance,server_name) (rate(node_cpu_seconds_total{mode="idle"}[5m])) * 100))[{range}:])"#,
        ),
        check(
            "mem_used_pct",
            "Memory Used (%)",
            "Memory usage ratio.",
            "100 * (1 - node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)",
        ),
        check(
            "mem_swap_used_pct",
            "Swap Used (%)",
            "Swap usage ratio.",
            "100 * (1 - node_memory_SwapFree_bytes / node_memory_SwapTotal_bytes)",
        ),
        check(
            "disk_used_pct_by_mount",
            "Disk Used (%) by Mount [0-100]",
            "Filesystem usage percent by mountpoint/device on a 0-100 scale \
             (example: 0.8 means 0.8%, not 80%). Use with instance/server_name \
             filter for one server.",
            r#"100 * (1 - (node_filesystem_avail_bytes{fstype!~"tmpfs|overlay"} / node_filesystem_size_bytes{fstype!~"tmpfs|overlay"}))"#,
        ),
        check(
            "disk_used_top5_pct",
            "Disk Used Top 5 (%)",
            "Top 5 filesystem usage excluding tmpfs/overlay.",
            r#"topk(5, 100 * (1 - (node_filesystem_avail_bytes{fstype!~"tmpfs|overlay"} / node_filesystem_size_bytes{fstype!~"tmpfs|overlay"})))"#,
        ),
        check(
            "disk_inodes_used_pct",
            "Disk Inodes Used (%)",
            "Filesystem inode usage ratio excluding tmpfs/overlay.",
            r#"100 * (1 - (node_filesystem_files_free{fstype!~"tmpfs|overlay"} / node_filesystem_files{fstype!~"tmpfs|overlay"}))"#,
        ),
        check(
            "fs_readonly",
            "Filesystem Readonly",
            "Readonly filesystem indicator (1=readonly).",
            r#"max by (instance,server_name,device,mountpoint,fstype) (node_filesystem_readonly{fstype!~"tmpfs|overlay"})"#,
        ),
        check(
            "load15_avg",
            "Load 15m (avg)",
            "15-minute load average by instance/server_name.",
            "avg by (instance, server_name) (node_load15)",
        ),
        check(
            "up",
            "Up",
            "Target liveness (1=up, 0=down).",
            "up",
        ),
        check(
            "cpu_iowait_pct",
            "CPU IOWAIT (%)",
            "CPU iowait ratio.",
            r#"avg by (instance,server_name) (rate(node_cpu_seconds_total{mode="iowait"}[5m])) * 100"#,
        ),
        check(
            "net_in_bytes",
            "Network Inbound (bytes/sec)",
            "Inbound network throughput excluding lo/docker/veth.",
            r#"sum by (instance,server_name) (rate(node_network_receive_bytes_total{device!~"lo|docker.*|veth.*"}[5m]))"#,
        ),
        check(
            "net_out_bytes",
            "Network Outbound (bytes/sec)",
            "Outbound network throughput excluding lo/docker/veth.",
            r#"sum by (instance,server_name) (rate(node_network_transmit_bytes_total{device!~"lo|docker.*|veth.*"}[5m]))"#,
        ),
        check(
            "net_errs_per_sec",
            "Network Errors (per sec)",
            "RX+TX network errors per second.",
            r#"sum by (instance,server_name) (rate(node_network_receive_errs_total{device!~"lo|docker.*|veth.*"}[5m]) + rate(node_network_transmit_errs_total{device!~"lo|docker.*|veth.*"}[5m]))"#,
        ),
        check(
            "tcp_retrans_per_sec",
            "TCP Retransmits (per sec)",
            "TCP retransmit segments per second.",
            "sum by (instance,server_name) (rate(node_netstat_Tcp_RetransSegs[5m]))",
        ),
        check(
            "disk_io_busy_pct",
            "Disk I/O Busy (%)",
            "Disk busy time ratio.",
            "avg by (instance,server_name) (rate(node_disk_io_time_seconds_total[5m])) * 100",
        ),
        check(
            "tcp_established",
            "TCP Established",
            "Current established TCP connections.",
            "sum by (instance,server_name) (node_netstat_Tcp_CurrEstab)",
        ),
        check(
            "tcp_time_wait",
            "TCP Time Wait",
            "Current TIME_WAIT TCP sockets.",
            "sum by (instance,server_name) (node_sockstat_TCP_tw)",
        ),
        check(
            "tcp_inuse",
            "TCP In Use",
            "Current in-use TCP sockets.",
            "sum by (instance,server_name) (node_sockstat_TCP_inuse)",
        ),
        check(
            "tcp_orphan",
            "TCP Orphan",
            "Current orphan TCP sockets.",
            "sum by (instance,server_name) (node_sockstat_TCP_orphan)",
        ),
        check(
            "proc_cpu_pct",
            "Process Group CPU (%)",
            "CPU usage by process group from process_monitoring job.",
            r#"sum by (instance,server_name,groupname) (rate(namedprocess_namegroup_cpu_seconds_total{job="process_monitoring"}[5m])) * 100"#,
        ),
        check(
            "proc_mem_bytes",
            "Process Group Memory (bytes)",
            "Memory usage by process group from process_monitoring job.",
            r#"max by (instance,server_name,groupname) (namedprocess_namegroup_memory_bytes{job="process_monitoring"})"#,
        ),
        check(
            "proc_count",
            "Process Group Count",
            "Process count by process group from process_monitoring job.",
            r#"max by (instance,server_name,groupname) (namedprocess_namegroup_num_procs{job="process_monitoring"})"#,
        ),
        check(
            "pg_up",
            "PostgreSQL Up",
            "PostgreSQL exporter up state (1=up, 0=down).",
            r#"up{job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"}"#,
        ),
        check(
            "pg_qps",
            "PostgreSQL QPS",
            "PostgreSQL commit+rollback throughput (transactions/sec).",
            r#"sum by (instance,server_name,datname) (rate(pg_stat_database_xact_commit{job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"}[5m]) + rate(pg_stat_database_xact_rollback{job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"}[5m]))"#,
        ),
        check(
            "pg_cache_hit_pct",
            "PostgreSQL Cache Hit (%)",
            "PostgreSQL buffer cache hit ratio.",
            r#"100 * sum by (instance,server_name,datname) (rate(pg_stat_database_blks_hit{job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"}[5m])) / sum by (instance,server_name,datname) (rate(pg_stat_database_blks_hit{job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"}[5m]) + rate(pg_stat_database_blks_read{job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"}[5m]))"#,
        ),
        check(
            "pg_active_conn",
            "PostgreSQL Active Connections",
            "Current active PostgreSQL connections.",
            r#"sum by (instance,server_name,datname) (pg_stat_activity_count{state="active",job=~"PROD DB PostgreSQL|TEST DB PostgreSQL|DEV DB PostgreSQL"})"#,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_are_unique() {
        let catalog = Catalog::builtin();
        let ids: HashSet<&str> = catalog.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn test_lookup_by_id() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.get("up").map(|c| c.name), Some("Up"));
        assert!(catalog.get("nope").is_none());
    }

    #[test]
    fn test_iteration_preserves_definition_order() {
        let catalog = Catalog::builtin();
        let first = catalog.iter().next().map(|c| c.id);
        assert_eq!(first, Some("cpu_avg_pct"));
    }

    #[test]
    fn test_range_placeholder_only_where_expected() {
        let catalog = Catalog::builtin();
        let with_placeholder: Vec<&str> = catalog
            .iter()
            .filter(|c| c.promql.contains("{range}"))
            .map(|c| c.id)
            .collect();
        assert_eq!(with_placeholder, vec!["cpu_peak_pct"]);
    }
}
