use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const BIN: &str = env!("CARGO_BIN_EXE_field-weaver");

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "field_weaver_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn run(args: &[&str]) -> anyhow::Result<Output> {
    Ok(Command::new(BIN)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("FIELD_WEAVER_CONFIG")
        .output()?)
}

fn run_json(args: &[&str]) -> anyhow::Result<Value> {
    let out = run(args)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

fn write_model_sources(src: &Path) -> anyhow::Result<()> {
    write_file(
        &src.join("io/weaver/Model.java"),
        "package io.weaver;\n\npublic interface Model {}\n",
    )?;
    write_file(
        &src.join("io/weaver/ModelObject.java"),
        "package io.weaver;\n\npublic abstract class ModelObject implements Model {}\n",
    )?;
    write_file(
        &src.join("com/example/Person.java"),
        r#"package com.example;

import io.weaver.ModelObject;
import io.weaver.annotations.Ignore;
import io.weaver.annotations.ModelClass;

@ModelClass
public class Person extends ModelObject {
    String name;
    int age;
    @Ignore String cache;

    public Person(String name) {
        this.name = name;
    }

    public void birthday() {
        age += 1;
    }
}
"#,
    )?;
    write_file(
        &src.join("com/example/Greeter.java"),
        r#"package com.example;

public class Greeter {
    public String greet(Person p) {
        return "Hello " + p.name;
    }
}
"#,
    )?;
    Ok(())
}

fn hashes(result: &Value) -> Vec<(String, String)> {
    result["written"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| {
            (
                w["class"].as_str().unwrap().to_string(),
                w["content_hash"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[test]
fn compile_weave_and_reweave() -> anyhow::Result<()> {
    let base = temp_dir("flow");
    let src = base.join("src");
    let classes = base.join("classes");
    let woven = base.join("woven.jar");
    let rewoven = base.join("rewoven.jar");
    write_model_sources(&src)?;

    let compiled = run_json(&[
        "compile",
        src.to_str().unwrap(),
        "--out",
        classes.to_str().unwrap(),
    ])?;
    assert_eq!(compiled["classes"].as_array().unwrap().len(), 4);
    assert!(classes.join("com/example/Person.class.json").is_file());

    let classified = run_json(&["classify", classes.to_str().unwrap()])?;
    let person = classified
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["class"] == "com.example.Person")
        .unwrap();
    assert_eq!(person["model"], true);
    assert_eq!(person["persisted_fields"], serde_json::json!(["name", "age"]));

    let first = run_json(&[
        "weave",
        classes.to_str().unwrap(),
        "--out",
        woven.to_str().unwrap(),
    ])?;
    let report = &first["report"];
    assert_eq!(report["failures"].as_array().unwrap().len(), 0);
    let greeter = report["classes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["class"] == "com.example.Greeter")
        .unwrap();
    assert_eq!(greeter["reads"], 1);
    assert_eq!(greeter["model"], false);

    let shown = run(&["show", woven.to_str().unwrap(), "com.example.Greeter"])?;
    assert!(shown.status.success());
    let text = String::from_utf8(shown.stdout)?;
    assert!(text.contains(r#"return "Hello " + p.get$name();"#), "{text}");

    let shown = run(&["show", woven.to_str().unwrap(), "com.example.Person"])?;
    let text = String::from_utf8(shown.stdout)?;
    assert!(text.contains("implements com_example_PersonProxyInterface"), "{text}");
    assert!(text.contains("this.set$age(this.get$age() + 1);"), "{text}");
    assert!(text.contains("weaver$transformerApplied()"), "{text}");
    assert!(!text.contains("get$cache"), "{text}");

    let second = run_json(&[
        "weave",
        woven.to_str().unwrap(),
        "--out",
        rewoven.to_str().unwrap(),
    ])?;
    assert_eq!(hashes(&first), hashes(&second));
    assert_eq!(std::fs::read(&woven)?, std::fs::read(&rewoven)?);

    std::fs::remove_dir_all(base)?;
    Ok(())
}

#[test]
fn failed_rewrite_writes_nothing() -> anyhow::Result<()> {
    let base = temp_dir("failure");
    let src = base.join("src");
    let classes = base.join("classes");
    let woven = base.join("woven");
    write_model_sources(&src)?;
    write_file(
        &src.join("com/example/Renamer.java"),
        r#"package com.example;

public class Renamer {
    public String rename(Person p) {
        String old = (p.name = "Ada");
        return old;
    }
}
"#,
    )?;

    run_json(&[
        "compile",
        src.to_str().unwrap(),
        "--out",
        classes.to_str().unwrap(),
    ])?;

    let out = run(&[
        "weave",
        classes.to_str().unwrap(),
        "--out",
        woven.to_str().unwrap(),
    ])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("com.example.Renamer"), "{stderr}");
    assert!(stderr.contains("com.example.Person.name"), "{stderr}");
    assert!(!woven.exists());

    std::fs::remove_dir_all(base)?;
    Ok(())
}
