//! End-to-end tests: specifications validated and built against the
//! built-in registry, then used as filesystems.

use fscomposer::*;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn mount(root: &str) -> MountDescriptor {
    MountDescriptor::new("api", root)
}

/// `id` out of a `build_all` result.
fn node<'a>(built: &'a [(String, SharedFs)], id: &str) -> &'a SharedFs {
    &built.iter().find(|(n, _)| n == id).unwrap().1
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn wrapper_cycle_is_rejected() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "loop")
        .node(Node::new("n1", "cachefs"))
        .node(Node::new("n2", "metricsfs"))
        .node(Node::new("n3", "logfs"))
        .connect("n1", "n2")
        .connect("n2", "n3")
        .connect("n3", "n1")
        .mount(mount("n3"));

    let err = Validator::new(&spec, &registry).validate_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
    assert!(err.to_string().starts_with("cycle detected in composition graph"));

    let err = Builder::new(&spec, &registry).build().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
}

#[test]
fn duplicate_ids_are_malformed() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "dup")
        .node(Node::new("mem", "memfs"))
        .node(Node::new("mem", "memfs"))
        .mount(mount("mem"));

    let err = Validator::new(&spec, &registry).validate_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSpecification);
    assert_eq!(err.to_string(), "malformed specification: duplicate node id: mem");
}

#[test]
fn wrapper_arity() {
    let registry = Registry::with_builtins();
    let two_inputs = CompositionSpec::new("1.0", "two")
        .node(Node::new("a", "memfs"))
        .node(Node::new("b", "memfs"))
        .node(Node::new("cache", "cachefs"))
        .connect("a", "cache")
        .connect("b", "cache")
        .mount(mount("cache"));
    let err = Validator::new(&two_inputs, &registry)
        .validate_all()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityViolation);
    assert!(err.to_string().starts_with("node cache (cachefs): "));

    let one_input = CompositionSpec::new("1.0", "one")
        .node(Node::new("a", "memfs"))
        .node(Node::new("cache", "cachefs"))
        .connect("a", "cache")
        .mount(mount("cache"));
    Validator::new(&one_input, &registry).validate_all().unwrap();

    let no_input = CompositionSpec::new("1.0", "none")
        .node(Node::new("cache", "cachefs"))
        .mount(mount("cache"));
    let err = Validator::new(&no_input, &registry)
        .validate_all()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityViolation);
}

#[test]
fn backends_and_multiplexers_take_no_connections() {
    let registry = Registry::with_builtins();
    let into_backend = CompositionSpec::new("1.0", "x")
        .node(Node::new("a", "memfs"))
        .node(Node::new("b", "memfs"))
        .connect("a", "b")
        .mount(mount("b"));
    let err = Validator::new(&into_backend, &registry)
        .validate_all()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityViolation);

    let into_union = CompositionSpec::new("1.0", "y")
        .node(Node::new("a", "memfs"))
        .node(Node::new("u", "unionfs").with("layers", vec!["a"]))
        .connect("a", "u")
        .mount(mount("u"));
    let err = Validator::new(&into_union, &registry)
        .validate_all()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityViolation);
}

#[test]
fn unknown_type_fails_validation_and_build() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "unknown")
        .node(Node::new("x", "floppyfs"))
        .mount(mount("x"));

    let err = Validator::new(&spec, &registry).validate_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownNodeType);
    assert_eq!(err.to_string(), "node x: unknown node type: floppyfs");

    let err = Builder::new(&spec, &registry).build().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::UnknownNodeType);
}

#[test]
fn dangling_mount_root() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "dangling")
        .node(Node::new("mem", "memfs"))
        .mount(mount("missing"));

    let err = Validator::new(&spec, &registry).validate_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DanglingReference);
}

#[test]
fn blank_mount_root_is_malformed() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "blank")
        .node(Node::new(" ", "memfs"))
        .mount(mount(" "));

    let err = Validator::new(&spec, &registry).validate_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSpecification);
    assert_eq!(err.to_string(), "malformed specification: mount root is required");

    let err = Builder::new(&spec, &registry).build().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedSpecification);
}

#[test]
fn validation_is_repeatable() {
    let registry = Registry::with_builtins();
    let good = CompositionSpec::new("1.0", "good")
        .node(Node::new("mem", "memfs"))
        .mount(mount("mem"));
    let bad = CompositionSpec::new("1.0", "bad")
        .node(Node::new("mem", "memfs"))
        .node(Node::new("cache", "cachefs").with("policy", "FIFO"))
        .connect("mem", "cache")
        .mount(mount("cache"));

    let validator = Validator::new(&good, &registry);
    assert!(validator.validate_all().is_ok());
    assert!(validator.validate_all().is_ok());

    let validator = Validator::new(&bad, &registry);
    let first = validator.validate_all().unwrap_err().to_string();
    let second = validator.validate_all().unwrap_err().to_string();
    assert_eq!(first, second);
    assert!(first.starts_with("node cache: invalid 'policy'"));
}

// =============================================================================
// Building
// =============================================================================

#[test]
fn cached_memory_round_trip() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "cached-memory")
        .node(Node::new("mem", "memfs"))
        .node(
            Node::new("cache", "cachefs")
                .with("maxBytes", 1048576)
                .with("policy", "LRU"),
        )
        .connect("mem", "cache")
        .mount(MountDescriptor::new("fuse", "cache"));

    let fs = Builder::new(&spec, &registry).build().unwrap();
    {
        let mut w = fs.open_write(Path::new("/greeting")).unwrap();
        w.write_all(b"hello").unwrap();
    }
    let mut text = String::new();
    fs.open_read(Path::new("/greeting"))
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "hello");
    assert_eq!(fs.read_to_string(Path::new("/greeting")).unwrap(), "hello");
}

#[test]
fn shared_backend_is_built_once() {
    let registry = Registry::with_builtins();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry.register(
        "memfs",
        move |_: &Config, _: Option<SharedFs>, _: &mut dyn Resolver| {
            counter.fetch_add(1, Ordering::SeqCst);
            let fs: SharedFs = Arc::new(nodes::MemFs::new());
            Ok(fs)
        },
        NodeSchema::new("memfs", "counting memory backend"),
    );

    let spec = CompositionSpec::new("1.0", "diamond")
        .node(Node::new("store", "memfs"))
        .node(Node::new("fast", "cachefs"))
        .node(Node::new("counted", "metricsfs"))
        .node(Node::new("view", "unionfs").with("layers", vec!["fast", "counted"]))
        .connect("store", "fast")
        .connect("store", "counted")
        .mount(mount("view"));

    let fs = Builder::new(&spec, &registry).build().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    fs.write(Path::new("/f"), b"shared").unwrap();
    assert_eq!(fs.read(Path::new("/f")).unwrap(), b"shared");

    Builder::new(&spec, &registry).build().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn build_all_shares_instances() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "all")
        .node(Node::new("mem", "memfs"))
        .node(Node::new("metrics", "metricsfs"))
        .connect("mem", "metrics")
        .mount(mount("metrics"));

    let built = Builder::new(&spec, &registry).build_all().unwrap();
    let ids: Vec<_> = built.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["mem", "metrics"]);

    node(&built, "metrics").write(Path::new("/x"), b"1").unwrap();
    assert!(node(&built, "mem").exists(Path::new("/x")).unwrap());
}

#[test]
fn constructor_failure_names_the_node() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "no-key")
        .node(Node::new("mem", "memfs"))
        .node(
            Node::new("enc", "encryptfs")
                .with("algorithm", "AES-256-GCM")
                .with("keySource", "env")
                .with("keyEnv", "FSCOMPOSER_TEST_KEY_THAT_IS_NEVER_SET"),
        )
        .connect("mem", "enc")
        .mount(mount("enc"));

    Validator::new(&spec, &registry).validate_all().unwrap();
    let err = Builder::new(&spec, &registry).build().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
    assert_eq!(
        err.to_string(),
        "failed to construct node enc (encryptfs): config 'keyEnv': \
         environment variable FSCOMPOSER_TEST_KEY_THAT_IS_NEVER_SET is not set"
    );
}

#[test]
fn custom_constructor_error_propagates() {
    let registry = Registry::with_builtins();
    registry.register(
        "metricsfs",
        |_: &Config, _: Option<SharedFs>, _: &mut dyn Resolver| {
            Err(NodeError::Unsupported("metrics are disabled".into()))
        },
        NodeSchema::new("metricsfs", "always fails"),
    );
    let spec = CompositionSpec::new("1.0", "custom")
        .node(Node::new("mem", "memfs"))
        .node(Node::new("m", "metricsfs"))
        .connect("mem", "m")
        .mount(mount("m"));

    let err = Builder::new(&spec, &registry).build().err().unwrap();
    assert_eq!(
        err.to_string(),
        "failed to construct node m (metricsfs): unsupported: metrics are disabled"
    );
}

// =============================================================================
// Built-in stacks
// =============================================================================

#[test]
fn os_backend_writes_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "disk")
        .node(Node::new("disk", "osfs").with("root", dir.path().to_str().unwrap()))
        .node(Node::new("retry", "retryfs").with("maxAttempts", 2).with("backoffMs", 0))
        .connect("disk", "retry")
        .mount(mount("retry"));

    let fs = Builder::new(&spec, &registry).build().unwrap();
    fs.create_dir_all(Path::new("/a/b")).unwrap();
    fs.write(Path::new("/a/b/file.txt"), b"on disk").unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("a/b/file.txt")).unwrap(),
        b"on disk"
    );
    assert!(fs.is_dir(Path::new("/a")).unwrap());
}

#[test]
fn encrypted_stack_with_key_file() {
    let mut key = tempfile::NamedTempFile::new().unwrap();
    writeln!(key, "correct horse battery staple").unwrap();

    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "vault")
        .node(Node::new("mem", "memfs"))
        .node(
            Node::new("enc", "encryptfs")
                .with("algorithm", "AES-256-GCM")
                .with("keySource", "file")
                .with("keyFile", key.path().to_str().unwrap()),
        )
        .connect("mem", "enc")
        .mount(mount("enc"));

    let built = Builder::new(&spec, &registry).build_all().unwrap();
    let (mem, enc) = (node(&built, "mem"), node(&built, "enc"));

    enc.write(Path::new("/secret"), b"plaintext").unwrap();
    assert_eq!(enc.read(Path::new("/secret")).unwrap(), b"plaintext");
    assert_eq!(enc.metadata(Path::new("/secret")).unwrap().size, 9);

    let stored = mem.read(Path::new("/secret")).unwrap();
    assert_eq!(stored.len(), 9 + 28);
    assert!(!stored.windows(9).any(|w| w == b"plaintext"));
}

#[test]
fn switch_routes_between_backends() {
    let registry = Registry::with_builtins();
    let route: ConfigValue = [("pattern", "*.log"), ("target", "logs")]
        .into_iter()
        .collect();
    let spec = CompositionSpec::new("1.0", "router")
        .node(Node::new("logs", "memfs"))
        .node(Node::new("data", "memfs"))
        .node(
            Node::new("router", "switchfs")
                .with("routes", vec![route])
                .with("default", "data"),
        )
        .mount(mount("router"));

    let built = Builder::new(&spec, &registry).build_all().unwrap();
    let router = node(&built, "router");
    router.write(Path::new("/app.log"), b"log line").unwrap();
    router.write(Path::new("/rows.csv"), b"1,2").unwrap();

    assert!(node(&built, "logs").exists(Path::new("/app.log")).unwrap());
    assert!(!node(&built, "data").exists(Path::new("/app.log")).unwrap());
    assert!(node(&built, "data").exists(Path::new("/rows.csv")).unwrap());
}

#[test]
fn union_shadows_lower_layer() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "overlay")
        .node(Node::new("upper", "memfs"))
        .node(Node::new("lower", "memfs"))
        .node(Node::new("view", "unionfs").with("layers", vec!["upper", "lower"]))
        .mount(mount("view"));

    let built = Builder::new(&spec, &registry).build_all().unwrap();
    let (upper, lower, view) = (
        node(&built, "upper"),
        node(&built, "lower"),
        node(&built, "view"),
    );

    lower.write(Path::new("/base"), b"from lower").unwrap();
    assert_eq!(view.read(Path::new("/base")).unwrap(), b"from lower");

    view.write(Path::new("/base"), b"from view").unwrap();
    assert_eq!(view.read(Path::new("/base")).unwrap(), b"from view");
    assert_eq!(upper.read(Path::new("/base")).unwrap(), b"from view");
    assert_eq!(lower.read(Path::new("/base")).unwrap(), b"from lower");
}

#[test]
fn built_stack_is_shareable_across_threads() {
    let registry = Registry::with_builtins();
    let spec = CompositionSpec::new("1.0", "threads")
        .node(Node::new("mem", "memfs"))
        .node(Node::new("cache", "cachefs").with("policy", "LFU"))
        .node(Node::new("log", "logfs").with("level", "debug"))
        .connect("mem", "cache")
        .connect("cache", "log")
        .mount(mount("log"));
    let fs = Builder::new(&spec, &registry).build().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fs = fs.clone();
            std::thread::spawn(move || {
                let path = format!("/file{i}");
                fs.write(Path::new(&path), path.as_bytes()).unwrap();
                fs.read(Path::new(&path)).unwrap()
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), format!("/file{i}").into_bytes());
    }
    assert_eq!(fs.read_dir(Path::new("/")).unwrap().collect_all().unwrap().len(), 4);
}

#[test]
fn wrappers_reject_open_write_without_parent() {
    let mut key = tempfile::NamedTempFile::new().unwrap();
    writeln!(key, "hunter2").unwrap();
    let key_file = key.path().to_str().unwrap();

    let registry = Registry::with_builtins();
    for wrapper in ["cachefs", "encryptfs", "metricsfs", "logfs", "retryfs"] {
        let mut node = Node::new("top", wrapper);
        if wrapper == "encryptfs" {
            node = node
                .with("algorithm", "AES-256-GCM")
                .with("keySource", "file")
                .with("keyFile", key_file);
        }
        let spec = CompositionSpec::new("1.0", wrapper)
            .node(Node::new("mem", "memfs"))
            .node(node)
            .connect("mem", "top")
            .mount(mount("top"));
        let fs = Builder::new(&spec, &registry).build().unwrap();
        assert!(
            matches!(fs.open_write(Path::new("/nodir/f")), Err(FsError::NotFound { .. })),
            "{wrapper} accepted a write under a missing directory"
        );
        fs.create_dir(Path::new("/d")).unwrap();
        assert!(
            matches!(fs.open_write(Path::new("/d")), Err(FsError::NotAFile { .. })),
            "{wrapper} accepted a write over a directory"
        );
    }
}

// =============================================================================
// Documents
// =============================================================================

#[cfg(feature = "serde")]
#[test]
fn json_document_builds() {
    let spec = CompositionSpec::from_json(
        r#"{
            "version": "1.0",
            "name": "from-json",
            "description": "memory behind a cache",
            "nodes": [
                {"id": "mem", "type": "memfs"},
                {"id": "cache", "type": "cachefs", "config": {"maxBytes": 1048576, "policy": "LRU"}},
                {"id": "metrics", "type": "metricsfs"}
            ],
            "connections": [
                {"from": "mem", "to": "cache"},
                {"from": "cache", "to": "metrics"}
            ],
            "mount": {"type": "fuse", "path": "/mnt/data", "root": "metrics"}
        }"#,
    )
    .unwrap();

    let registry = Registry::with_builtins();
    let fs = Builder::new(&spec, &registry).build().unwrap();
    fs.write(Path::new("/doc"), b"json").unwrap();
    assert_eq!(fs.read(Path::new("/doc")).unwrap(), b"json");
}

#[cfg(feature = "serde")]
#[test]
fn json_document_missing_fields_is_malformed() {
    let registry = Registry::with_builtins();
    let cases = [
        (
            r#"{"name": "n", "nodes": [{"id": "m", "type": "memfs"}], "mount": {"type": "api", "root": "m"}}"#,
            "version is required",
        ),
        (
            r#"{"version": "1.0", "name": "n", "nodes": [{"type": "memfs"}], "mount": {"type": "api", "root": "m"}}"#,
            "node 0: id is required",
        ),
        (
            r#"{"version": "1.0", "name": "n", "nodes": [{"id": "m"}], "mount": {"type": "api", "root": "m"}}"#,
            "node m: type is required",
        ),
        (
            r#"{"version": "1.0", "name": "n", "nodes": [{"id": "m", "type": "memfs"}], "mount": {"type": "api"}}"#,
            "mount root is required",
        ),
    ];
    for (doc, message) in cases {
        let spec = CompositionSpec::from_json(doc).unwrap();
        let err = Validator::new(&spec, &registry).validate_all().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSpecification);
        assert_eq!(err.to_string(), format!("malformed specification: {message}"));
    }
}

#[cfg(feature = "serde")]
#[test]
fn registry_description_serializes() {
    let registry = Registry::with_builtins();
    let info = registry.describe("cachefs").unwrap();
    assert_eq!(info.category, Some(NodeCategory::Wrapper));
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["category"], "wrapper");
}
