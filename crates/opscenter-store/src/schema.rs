/// Indexed columns carry everything the list queries filter or sort on; the
/// `doc` column holds the canonical serde encoding of the entity.
pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS error_groups(
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  last_seen_at INTEGER NOT NULL,
  version INTEGER NOT NULL,
  doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_error_groups_tenant_seen
  ON error_groups(tenant_id, last_seen_at DESC);

CREATE TABLE IF NOT EXISTS incidents(
  id TEXT PRIMARY KEY,
  idempotency_key TEXT NOT NULL UNIQUE,
  error_group_id TEXT NOT NULL,
  tenant_id TEXT,
  status TEXT NOT NULL,
  started_at INTEGER NOT NULL,
  doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_incidents_group_status
  ON incidents(error_group_id, status);

CREATE TABLE IF NOT EXISTS replay_runs(
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_replay_runs_tenant_status
  ON replay_runs(tenant_id, status);

CREATE TABLE IF NOT EXISTS replay_steps(
  id TEXT PRIMARY KEY,
  run_id TEXT NOT NULL,
  endpoint TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_replay_steps_run ON replay_steps(run_id, created_at);

CREATE TABLE IF NOT EXISTS replay_leases(
  tenant_id TEXT PRIMARY KEY,
  run_id TEXT NOT NULL,
  expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS action_logs(
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_action_logs_tenant_status
  ON action_logs(tenant_id, status);

CREATE TABLE IF NOT EXISTS tenant_health(
  tenant_id TEXT PRIMARY KEY,
  doc TEXT NOT NULL
);
";
