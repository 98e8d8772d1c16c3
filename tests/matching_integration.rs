use class_matcher::classifier::ClassifierLevel;
use class_matcher::config::{MatcherConfig, ProjectConfig};
use class_matcher::executor::BatchControl;
use class_matcher::model::Side;
use class_matcher::session::Session;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const ACC_PUBLIC: u16 = 0x0001;
const ACC_STATIC: u16 = 0x0008;
const ACC_SUPER: u16 = 0x0020;

const INVOKESTATIC: u8 = 0xb8;
const RETURN: u8 = 0xb1;

fn temp_dir(name: &str) -> anyhow::Result<PathBuf> {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "class_matcher_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Constant pool with deduplicated entries, indices starting at 1.
#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    count: u16,
    seen: HashMap<Vec<u8>, u16>,
}

impl Pool {
    fn add(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(index) = self.seen.get(&entry) {
            return *index;
        }
        self.count += 1;
        self.bytes.extend_from_slice(&entry);
        self.seen.insert(entry, self.count);
        self.count
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        self.add(entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name.to_be_bytes());
        self.add(entry)
    }

    fn method_ref(&mut self, owner: &str, name: &str, desc: &str) -> u16 {
        let owner = self.class(owner);
        let (name, desc) = (self.utf8(name), self.utf8(desc));
        let mut nat = vec![12];
        nat.extend_from_slice(&name.to_be_bytes());
        nat.extend_from_slice(&desc.to_be_bytes());
        let nat = self.add(nat);
        let mut entry = vec![10];
        entry.extend_from_slice(&owner.to_be_bytes());
        entry.extend_from_slice(&nat.to_be_bytes());
        self.add(entry)
    }
}

struct MethodDef {
    name: &'static str,
    desc: &'static str,
    access: u16,
    /// Static call targets `(owner, name, desc)` emitted before the final `return`.
    calls: Vec<(&'static str, &'static str, &'static str)>,
}

/// Serializes a minimal class file: static methods with straight-line code, no fields.
fn class_file(name: &str, methods: &[MethodDef]) -> Vec<u8> {
    let mut pool = Pool::default();
    let this = pool.class(name);
    let sup = pool.class("java/lang/Object");
    let code_attr = pool.utf8("Code");

    let mut body = Vec::new();
    body.extend_from_slice(&(ACC_PUBLIC | ACC_SUPER).to_be_bytes());
    body.extend_from_slice(&this.to_be_bytes());
    body.extend_from_slice(&sup.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&(methods.len() as u16).to_be_bytes());
    for method in methods {
        let mut code = Vec::new();
        for (owner, callee, desc) in &method.calls {
            code.push(INVOKESTATIC);
            code.extend_from_slice(&pool.method_ref(owner, callee, desc).to_be_bytes());
        }
        code.push(RETURN);

        body.extend_from_slice(&method.access.to_be_bytes());
        body.extend_from_slice(&pool.utf8(method.name).to_be_bytes());
        body.extend_from_slice(&pool.utf8(method.desc).to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&code_attr.to_be_bytes());
        body.extend_from_slice(&(12 + code.len() as u32).to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(&code);
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
    }
    body.extend_from_slice(&0u16.to_be_bytes());

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&52u16.to_be_bytes());
    out.extend_from_slice(&(pool.count + 1).to_be_bytes());
    out.extend_from_slice(&pool.bytes);
    out.extend_from_slice(&body);
    out
}

fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

fn calling_lib(name: &'static str) -> MethodDef {
    MethodDef {
        name,
        desc: "()V",
        access: ACC_PUBLIC | ACC_STATIC,
        calls: vec![("lib/Lib", "log", "()V")],
    }
}

/// Side A `ab.a()V` and side B `cd.b()V` both calling the shared `lib/Lib.log()V`.
fn write_project(dir: &Path) -> anyhow::Result<PathBuf> {
    let lib = class_file(
        "lib/Lib",
        &[MethodDef {
            name: "log",
            desc: "()V",
            access: ACC_PUBLIC | ACC_STATIC,
            calls: Vec::new(),
        }],
    );
    write_jar(&dir.join("lib.jar"), &[("lib/Lib.class", lib)])?;
    write_jar(&dir.join("a.jar"), &[("ab.class", class_file("ab", &[calling_lib("a")]))])?;
    write_jar(&dir.join("b.jar"), &[("cd.class", class_file("cd", &[calling_lib("b")]))])?;

    let project = dir.join("project.json");
    std::fs::write(
        &project,
        r#"{
            "inputs_a": ["a.jar"],
            "inputs_b": ["b.jar"],
            "shared_classpath": ["lib.jar"],
            "matcher": { "threads": 2 }
        }"#,
    )?;
    Ok(project)
}

#[test]
fn class_then_member_auto_match_pairs_the_library_callers() -> anyhow::Result<()> {
    let dir = temp_dir("e2e")?;
    let project = ProjectConfig::load(&write_project(&dir)?)?;
    let mut session = Session::new(project.matcher.clone())?;
    session.load(&project)?;
    assert_eq!(session.inputs().len(), 2);
    assert_eq!(session.inputs()[0].sha256.len(), 64);

    let ab = session.find_class(Side::A, "ab").expect("ab");
    let cd = session.find_class(Side::B, "cd").expect("cd");
    let control = BatchControl::new();

    assert!(session.auto_match_classes(ClassifierLevel::Initial, &control)?);
    assert_eq!(session.matches().class(ab), Some(cd));

    assert!(session.auto_match_members(ClassifierLevel::Intermediate, &control)?);
    let a = session.graph().class(ab).methods()[0];
    let b = session.graph().class(cd).methods()[0];
    assert_eq!(session.graph().method(a).name(), "a");
    assert_eq!(session.matches().method(a), Some(b));
    assert_eq!(session.matches().method(b), Some(a));

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn failed_load_leaves_an_empty_session() -> anyhow::Result<()> {
    let dir = temp_dir("reset")?;
    let mut project = ProjectConfig::load(&write_project(&dir)?)?;
    let mut session = Session::new(MatcherConfig::default())?;
    session.load(&project)?;
    assert!(session.graph().class_count() > 0);

    project.inputs_b.push(dir.join("missing.jar"));
    assert!(session.load(&project).is_err());
    assert_eq!(session.graph().class_count(), 0);
    assert!(session.inputs().is_empty());
    assert!(session.find_class(Side::A, "ab").is_none());

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn match_command_prints_status_and_pairs() -> anyhow::Result<()> {
    let dir = temp_dir("cli")?;
    let project = write_project(&dir)?;

    let out = Command::new(env!("CARGO_BIN_EXE_class-matcher"))
        .args(["--project", project.to_string_lossy().as_ref(), "match", "--pairs"])
        .output()?;
    if !out.status.success() {
        anyhow::bail!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        );
    }
    let json: Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(json["status"]["classes"]["matched"], Value::from(1));
    assert_eq!(json["status"]["methods"]["matched"], Value::from(1));
    assert_eq!(json["pairs"][0]["a"], Value::from("Lab;"));
    assert_eq!(json["pairs"][0]["b"], Value::from("Lcd;"));
    assert_eq!(json["pairs"][1]["a"], Value::from("Lab;/a()V"));

    std::fs::remove_dir_all(dir)?;
    Ok(())
}
