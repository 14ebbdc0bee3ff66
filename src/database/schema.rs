pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    created TEXT NOT NULL,
    edited TEXT,
    deleted TEXT
);

CREATE TABLE IF NOT EXISTS ssh_keys (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    key_type INTEGER NOT NULL,
    data BLOB NOT NULL,
    created TEXT NOT NULL,
    deleted TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_ssh_keys_live_data ON ssh_keys(data) WHERE deleted IS NULL;
CREATE INDEX IF NOT EXISTS idx_ssh_keys_user ON ssh_keys(user_id);

CREATE TABLE IF NOT EXISTS repos (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created TEXT NOT NULL,
    edited TEXT,
    deleted TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_repos_live_name ON repos(name) WHERE deleted IS NULL;

CREATE TABLE IF NOT EXISTS access_roles (
    role_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    repo_id TEXT NOT NULL REFERENCES repos(id),
    branch_pattern TEXT,
    created TEXT NOT NULL,
    deleted TEXT
);
CREATE INDEX IF NOT EXISTS idx_access_roles_user_repo ON access_roles(user_id, repo_id);

CREATE TABLE IF NOT EXISTS refs (
    repo_id TEXT NOT NULL REFERENCES repos(id),
    name TEXT NOT NULL,
    object_id TEXT NOT NULL,
    updated TEXT NOT NULL,
    PRIMARY KEY (repo_id, name)
);
"#;
