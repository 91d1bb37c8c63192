//! Full install of a configured project against a recording executor.

use bount::build_stack;
use common::config::load_config;
use common::remote::testing::RecordingExecutor;
use stack::hooks::{HookEvent, Hooks, Phase};
use stack::Lifecycle;
use std::path::Path;
use std::sync::{Arc, Mutex};

const PG_HBA: &str = "/etc/postgresql/9.1/main/pg_hba.conf";
const PG_CONF: &str = "/etc/postgresql/9.1/main/postgresql.conf";

fn write_config(root: &Path) -> std::path::PathBuf {
    let config = format!(
        r#"
[project]
name = "site"
local_root = "{root}"
source_root = "src"
settings_module = "settings_production"
dependencies = ["south"]
environment = {{ LANG = "en_US.UTF-8" }}

[settings]
database = {{ engine = "django.db.backends.postgresql_psycopg2", name = "site", user = "site", password = "secret" }}
admins = [["Admin", "admin@example.com"]]
installed_apps = ["django.contrib.staticfiles", "south"]

[hosts.web1]
address = "10.0.0.5"
user = "deploy"
key_path = "~/.ssh/id_rsa"

[backup]
default = "archives"

[backup.destinations.archives]
kind = "client"
folder = "{root}/archives"
"#,
        root = root.display()
    );
    let path = root.join("bount.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn recording_remote() -> Arc<RecordingExecutor> {
    let remote = Arc::new(RecordingExecutor::new("web1"));
    remote.respond("python --version", "Python 2.7.3");
    remote.respond("psql --version", "psql (PostgreSQL) 9.1.3");
    remote.respond("echo $HOME", "/home/deploy");
    remote.respond("whoami", "deploy");
    remote.respond("pg_database", " result \n--------\n(0 rows)\n");
    remote.put_file(PG_HBA, "local   all             all                                     peer\n");
    remote.put_file(PG_CONF, "#listen_addresses = 'localhost'\n");
    remote
}

fn recording_hooks(events: &Arc<Mutex<Vec<String>>>) -> Hooks {
    let mut hooks = Hooks::new();
    for phase in [Phase::Install, Phase::StopWebserver, Phase::ConfigureWebserver] {
        for event in [HookEvent::Before, HookEvent::After] {
            let events = events.clone();
            hooks.on(event, phase, move |ctx| {
                events.lock().unwrap().push(format!("{}:{}_{}", ctx.host, ctx.event, ctx.phase));
                Ok(())
            });
        }
    }
    hooks
}

#[tokio::test]
async fn install_runs_every_step_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(Some(&write_config(dir.path()))).unwrap();
    let remote = recording_remote();
    let stack = build_stack(&config, "web1", remote.clone()).await.unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let lifecycle = Lifecycle::new(Arc::new(stack), recording_hooks(&events));

    lifecycle.install(false).await.unwrap();

    let steps = [
        "sudo: apt-get update",
        "apt-get install -y nginx",
        "pip install gunicorn",
        "pip install south",
        "put[sudo]: /usr/local/share/site/site/ENV/bin/activate",
        "put[sudo]: /etc/postgresql/9.1/main/pg_hba.conf",
        "CREATE USER site",
        "CREATE DATABASE site WITH OWNER site",
        "sudo: mkdir -p /usr/local/share/site/media",
        "local: cd ",
        "syncdb --noinput",
        "django-admin.py migrate",
        "collectstatic --noinput --clear",
        "put[sudo]: /usr/local/share/site/site/wsgi_handler.py",
        "put[sudo]: /etc/nginx/sites-enabled/site",
        "put[sudo]: /etc/supervisor/conf.d/site_gunicorn.conf",
        "sudo: service nginx start",
    ];
    let positions: Vec<usize> = steps
        .iter()
        .map(|step| remote.position(step).unwrap_or_else(|| panic!("missing step {step}")))
        .collect();
    assert!(
        positions.windows(2).all(|pair| pair[0] < pair[1]),
        "steps out of order: {:?}",
        steps.iter().zip(&positions).collect::<Vec<_>>()
    );

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "web1:before_install",
            "web1:before_stop_webserver",
            "web1:after_stop_webserver",
            "web1:before_configure_webserver",
            "web1:after_configure_webserver",
            "web1:after_install",
        ]
    );

    let vhost = remote.file("/etc/nginx/sites-enabled/site").unwrap();
    assert!(vhost.contains("server_name 10.0.0.5;"));
    assert!(vhost.contains("alias /usr/local/share/site/media/;"));

    let entry_point = remote.file("/usr/local/share/site/site/wsgi_handler.py").unwrap();
    assert!(entry_point.contains("os.environ['DJANGO_SETTINGS_MODULE'] = 'settings_production'"));
    assert!(entry_point.contains("os.path.normpath('/usr/local/share/site/src')"));

    let program = remote.file("/etc/supervisor/conf.d/site_gunicorn.conf").unwrap();
    assert!(program.contains("directory=/usr/local/share/site/src"));
    assert!(program.contains("/usr/local/share/site/site/ENV/bin/gunicorn"));
    assert!(program.contains("environment=LANG='en_US.UTF-8'"));

    assert!(remote.file(PG_HBA).unwrap().contains("local\tall\tall\t\tmd5"));
}

#[tokio::test]
async fn built_stack_exposes_configured_destinations() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(Some(&write_config(dir.path()))).unwrap();
    let stack = build_stack(&config, "web1", recording_remote()).await.unwrap();

    assert_eq!(stack.project_name(), "site");
    assert_eq!(stack.host(), "web1");
    assert_eq!(
        stack.list_destinations(),
        vec![format!("archives (default): local folder {}/archives", dir.path().display())]
    );
}

#[tokio::test]
async fn unsupported_database_engines_fail_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());
    let text = std::fs::read_to_string(&path)
        .unwrap()
        .replace("postgresql_psycopg2", "mysql");
    std::fs::write(&path, text).unwrap();
    let config = load_config(Some(&path)).unwrap();

    let err = build_stack(&config, "web1", recording_remote()).await.err().unwrap();
    assert_eq!(err.to_string(), "Invalid database engine: \"django.db.backends.mysql\"");
}

#[tokio::test]
async fn updates_keep_the_sqlite_database_out_of_the_wiped_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());
    let text = std::fs::read_to_string(&path).unwrap().replace(
        r#"database = { engine = "django.db.backends.postgresql_psycopg2", name = "site", user = "site", password = "secret" }"#,
        r#"database = { engine = "django.db.backends.sqlite3", name = "db.sqlite" }"#,
    );
    std::fs::write(&path, text).unwrap();
    let config = load_config(Some(&path)).unwrap();
    let remote = recording_remote();
    let stack = build_stack(&config, "web1", remote.clone()).await.unwrap();
    let lifecycle = Lifecycle::new(Arc::new(stack), Hooks::new());

    lifecycle.update().await.unwrap();

    let dump = remote
        .position("gzip -c /usr/local/share/site/site/db.sqlite > /tmp/site_db_")
        .unwrap_or_else(|| panic!("database not dumped from site/: {:#?}", remote.commands()));
    let parked = remote
        .position("mv /usr/local/share/site/site /home/deploy/tmp")
        .expect("site folder parked before the wipe");
    let wiped = remote
        .position("rm -rf /usr/local/share/site/*")
        .expect("project root cleared");
    let restored = remote
        .position("mv /home/deploy/tmp/site /usr/local/share/site")
        .expect("site folder moved back");
    assert!(dump < parked && parked < wiped && wiped < restored);
    assert!(remote
        .commands()
        .iter()
        .all(|command| !command.contains("/usr/local/share/site/db.sqlite")));
}
