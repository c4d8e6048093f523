use launcher_cli::config::LauncherConfig;
use launcher_cli::launcher::{LaunchError, Launcher, Phase};
use launcher_common::object_store::{MemoryStoreOpener, StoreError};
use launcher_common::types::{Artifact, EventType, ExecutionState, Value};
use launcher_metadata::service::method;
use launcher_metadata::{InMemoryMetadataStore, MetadataClient};
use std::path::Path;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    metadata: InMemoryMetadataStore,
    objects: MemoryStoreOpener,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            metadata: InMemoryMetadataStore::new(),
            objects: MemoryStoreOpener::new(),
        }
    }

    fn path(&self, relative: &str) -> String {
        self.dir.path().join(relative).to_string_lossy().into_owned()
    }

    fn config(&self, runtime_info_json: &str) -> LauncherConfig {
        LauncherConfig {
            pipeline_name: "p".into(),
            pipeline_run_id: "r".into(),
            pipeline_task_id: "t".into(),
            pipeline_root: "gs://bucket/prefix".into(),
            task_name: "train".into(),
            mlmd_server_address: "localhost".into(),
            runtime_info_json: runtime_info_json.into(),
            input_staging_root: self.dir.path().join("inputs"),
            output_staging_root: self.dir.path().join("outputs"),
            ..Default::default()
        }
    }

    fn launcher(&self, config: LauncherConfig) -> Launcher<InMemoryMetadataStore> {
        Launcher::new(
            config,
            self.metadata.clone(),
            Box::new(self.objects.clone()),
        )
        .unwrap()
    }
}

fn sh(script: &str, args: &[&str]) -> Vec<String> {
    let mut command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
    command.extend(args.iter().map(|arg| arg.to_string()));
    command
}

fn read_record(path: &str) -> Artifact {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn uploads_and_records_output_artifact() {
    let fixture = Fixture::new();
    let sink = fixture.path("out/ds");
    let runtime_info = serde_json::json!({
        "outputArtifacts": {"ds": {"schema": "title: kfp.Dataset", "declaredSinkPath": sink}}
    })
    .to_string();

    let mut config = fixture.config(&runtime_info);
    config.container_image = Some("python:3.12".into());
    let outcome = fixture
        .launcher(config)
        .run(&sh(
            "printf 'a,b\\n1,2\\n' > \"$0\"",
            &["{{$.outputs.artifacts['ds'].path}}"],
        ))
        .await
        .unwrap();

    let artifact = &outcome.output_artifacts["ds"];
    assert_eq!(artifact.uri(), "gs://bucket/prefix/p/r/t/data");
    assert_eq!(&read_record(&sink), artifact);
    assert_eq!(fixture.metadata.artifacts(), vec![artifact.clone()]);

    assert_eq!(
        fixture.objects.get("prefix/p/r/t/data").unwrap(),
        b"a,b\n1,2\n".to_vec()
    );
    let staged = fixture.dir.path().join("outputs/ds/data");
    assert_eq!(std::fs::read(staged).unwrap(), b"a,b\n1,2\n".to_vec());
    assert_eq!(fixture.objects.open_count(), 1);
    assert_eq!(fixture.objects.close_count(), 1);

    let execution = &outcome.execution;
    assert_eq!(execution.last_known_state, Some(ExecutionState::Complete));
    let properties = &execution.custom_properties;
    assert_eq!(properties["task_name"], Value::from("train"));
    assert_eq!(properties["kfp_pod_name"], Value::from("t"));
    assert_eq!(properties["container_image"], Value::from("python:3.12"));
    assert_eq!(properties["pipeline_name"], Value::from("p"));
    assert_eq!(properties["pipeline_run_id"], Value::from("r"));

    let events = fixture.metadata.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Output);
    assert_eq!(events[0].artifact_id, artifact.id);
    assert_eq!(events[0].execution_id, execution.id);
}

#[tokio::test]
async fn stages_inputs_and_records_parameters() {
    let fixture = Fixture::new();

    let upstream = MetadataClient::new(fixture.metadata.clone(), "p", "r")
        .record_artifact(
            "title: kfp.Dataset",
            Artifact::with_uri("gs://bucket/prefix/p/r/upstream/data"),
        )
        .await
        .unwrap();
    fixture
        .objects
        .insert("prefix/p/r/upstream/data", b"rows".to_vec());
    let side_channel = fixture.path("side/ds");
    std::fs::create_dir_all(fixture.dir.path().join("side")).unwrap();
    std::fs::write(&side_channel, serde_json::to_vec(&upstream).unwrap()).unwrap();

    let count_sink = fixture.path("params/count");
    let runtime_info = serde_json::json!({
        "inputArtifacts": {"ds": {"fileInputPath": side_channel}},
        "inputParameters": {
            "epochs": {"parameterType": "INT", "parameterValue": "3"},
            "optimizer": "adam"
        },
        "outputParameters": {"count": {"parameterType": "INT", "fileOutputPath": count_sink}}
    })
    .to_string();

    let outcome = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh(
            "test \"$(cat \"$0\")\" = rows && test \"$1\" = gs://bucket/prefix/p/r/upstream/data \
             && test \"$2\" = 3 && test \"$3\" = adam && printf 42 > \"$4\"",
            &[
                "{{$.inputs.artifacts['ds'].path}}",
                "{{$.inputs.artifacts['ds'].uri}}",
                "{{$.inputs.parameters['epochs']}}",
                "{{$.inputs.parameters['optimizer']}}",
                "{{$.outputs.parameters['count'].output_file}}",
            ],
        ))
        .await
        .unwrap();

    let staged = fixture.dir.path().join("inputs/ds/data");
    assert_eq!(std::fs::read(staged).unwrap(), b"rows".to_vec());
    assert!(outcome.output_artifacts.is_empty());
    // only the input side needed a store
    assert_eq!(fixture.objects.open_count(), 1);
    assert_eq!(fixture.objects.close_count(), 1);

    let properties = &outcome.execution.custom_properties;
    assert_eq!(properties["input:epochs"], Value::Int(3));
    assert_eq!(properties["input:optimizer"], Value::from("adam"));
    assert_eq!(properties["output:count"], Value::Int(42));

    let events = fixture.metadata.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Input);
    assert_eq!(events[0].artifact_id, upstream.id);
}

#[tokio::test]
async fn failed_step_records_nothing() {
    let fixture = Fixture::new();
    let sink = fixture.path("out/ds");
    let runtime_info = serde_json::json!({
        "outputArtifacts": {"ds": {"artifactSchema": "title: kfp.Dataset", "fileOutputPath": sink}}
    })
    .to_string();

    let failure = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh("printf partial > \"$0\"; exit 2", &["{{$.outputs.artifacts['ds'].path}}"]))
        .await
        .unwrap_err();

    assert_eq!(failure.phase, Phase::Exec);
    assert!(matches!(failure.error, LaunchError::ChildFailed { .. }));
    assert!(failure.to_string().starts_with("EXEC failed: "));
    assert!(fixture.metadata.calls().is_empty());
    assert_eq!(fixture.objects.open_count(), 0);
    assert!(fixture.objects.object_names().is_empty());
    assert!(!Path::new(&sink).exists());
}

#[tokio::test]
async fn output_artifacts_of_one_task_share_a_key() {
    let fixture = Fixture::new();
    let runtime_info = serde_json::json!({
        "outputArtifacts": {
            "a": {"artifactSchema": "title: kfp.Dataset", "fileOutputPath": fixture.path("out/a")},
            "b": {"artifactSchema": "title: kfp.Model", "fileOutputPath": fixture.path("out/b")}
        }
    })
    .to_string();

    let outcome = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh(
            "printf A > \"$0\" && printf B > \"$1\"",
            &[
                "{{$.outputs.artifacts['a'].path}}",
                "{{$.outputs.artifacts['b'].path}}",
            ],
        ))
        .await
        .unwrap();

    let a = &outcome.output_artifacts["a"];
    let b = &outcome.output_artifacts["b"];
    assert_eq!(a.uri(), "gs://bucket/prefix/p/r/t/data");
    assert_eq!(a.uri(), b.uri());
    assert_ne!(a.id, b.id);

    // the upload of "b" lands last and overwrites "a"
    assert_eq!(fixture.objects.object_names(), vec!["prefix/p/r/t/data"]);
    assert_eq!(fixture.objects.get("prefix/p/r/t/data").unwrap(), b"B".to_vec());
}

#[tokio::test]
async fn per_artifact_keys_keep_outputs_apart() {
    let fixture = Fixture::new();
    let runtime_info = serde_json::json!({
        "outputArtifacts": {
            "a": {"artifactSchema": "title: kfp.Dataset", "fileOutputPath": fixture.path("out/a")},
            "b": {"artifactSchema": "title: kfp.Model", "fileOutputPath": fixture.path("out/b")}
        }
    })
    .to_string();

    let mut config = fixture.config(&runtime_info);
    config.per_artifact_output_keys = true;
    let outcome = fixture
        .launcher(config)
        .run(&sh(
            "printf A > \"$0\" && printf B > \"$1\"",
            &[
                "{{$.outputs.artifacts['a'].path}}",
                "{{$.outputs.artifacts['b'].path}}",
            ],
        ))
        .await
        .unwrap();

    assert_eq!(
        outcome.output_artifacts["a"].uri(),
        "gs://bucket/prefix/p/r/t/a/data"
    );
    assert_eq!(
        fixture.objects.object_names(),
        vec!["prefix/p/r/t/a/data", "prefix/p/r/t/b/data"]
    );
    assert_eq!(fixture.objects.get("prefix/p/r/t/a/data").unwrap(), b"A".to_vec());
}

#[tokio::test]
async fn missing_input_object_closes_the_store() {
    let fixture = Fixture::new();
    let side_channel = fixture.path("ds.json");
    std::fs::write(
        &side_channel,
        r#"{"id": "9", "uri": "gs://bucket/prefix/p/r/gone/data"}"#,
    )
    .unwrap();
    let runtime_info = serde_json::json!({
        "inputArtifacts": {"ds": {"fileInputPath": side_channel}}
    })
    .to_string();

    let failure = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh("exit 0", &[]))
        .await
        .unwrap_err();

    assert_eq!(failure.phase, Phase::StageInputs);
    match &failure.error {
        LaunchError::Artifact { name, source } => {
            assert_eq!(name, "ds");
            assert!(matches!(
                source.as_ref(),
                LaunchError::Store(StoreError::NotFound { .. })
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fixture.objects.open_count(), 1);
    assert_eq!(fixture.objects.close_count(), 1);
    assert!(fixture.metadata.calls().is_empty());
}

#[tokio::test]
async fn schema_without_title_stops_before_registration() {
    let fixture = Fixture::new();
    let runtime_info = serde_json::json!({
        "outputArtifacts": {
            "ds": {"artifactSchema": "type: object", "fileOutputPath": fixture.path("out/ds")}
        }
    })
    .to_string();

    let failure = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh("printf x > \"$0\"", &["{{$.outputs.artifacts['ds'].path}}"]))
        .await
        .unwrap_err();

    assert_eq!(failure.phase, Phase::UploadRecord);
    assert_eq!(fixture.metadata.call_count(method::PUT_ARTIFACT_TYPE), 0);
    assert_eq!(fixture.metadata.call_count(method::PUT_ARTIFACTS), 0);
    assert_eq!(fixture.metadata.call_count(method::PUT_EXECUTION), 0);
    assert!(fixture.objects.object_names().is_empty());
    assert_eq!(fixture.objects.close_count(), fixture.objects.open_count());
}

#[test]
fn init_failures_name_the_problem() {
    let fixture = Fixture::new();

    let mut config = fixture.config("");
    config.pipeline_name = String::new();
    let failure = Launcher::new(
        config,
        fixture.metadata.clone(),
        Box::new(fixture.objects.clone()),
    )
    .err()
    .unwrap();
    assert_eq!(failure.phase, Phase::Init);
    assert_eq!(failure.to_string(), "INIT failed: Must specify pipeline_name");

    let mut config = fixture.config("");
    config.pipeline_root = "ftp://bucket/prefix".into();
    let failure = Launcher::new(
        config,
        fixture.metadata.clone(),
        Box::new(fixture.objects.clone()),
    )
    .err()
    .unwrap();
    assert!(matches!(failure.error, LaunchError::StorageRoot(_)));

    let failure = Launcher::new(
        fixture.config("{\"outputArtifacts\": 3}"),
        fixture.metadata.clone(),
        Box::new(fixture.objects.clone()),
    )
    .err()
    .unwrap();
    assert!(matches!(failure.error, LaunchError::RuntimeInfo(_)));
}

#[tokio::test]
async fn non_utf8_output_parameter_is_still_recorded() {
    let fixture = Fixture::new();
    let sink = fixture.path("params/label");
    let runtime_info = serde_json::json!({
        "outputParameters": {"label": {"parameterType": "STRING", "fileOutputPath": sink}}
    })
    .to_string();

    let outcome = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh(
            "printf 'ok\\377' > \"$0\"",
            &["{{$.outputs.parameters['label'].output_file}}"],
        ))
        .await
        .unwrap();

    assert_eq!(
        outcome.execution.custom_properties["output:label"],
        Value::from("ok\u{FFFD}")
    );
    assert_eq!(fixture.metadata.executions().len(), 1);
}

#[tokio::test]
async fn artifact_names_outside_the_staging_root_are_rejected() {
    let fixture = Fixture::new();
    let escape = fixture.dir.path().join("escaped");
    let mut outputs = serde_json::Map::new();
    outputs.insert(
        escape.to_string_lossy().into_owned(),
        serde_json::json!({"artifactSchema": "title: kfp.Dataset", "fileOutputPath": fixture.path("out/ds")}),
    );
    let runtime_info = serde_json::json!({ "outputArtifacts": outputs }).to_string();

    let failure = fixture
        .launcher(fixture.config(&runtime_info))
        .run(&sh("exit 0", &[]))
        .await
        .unwrap_err();

    assert_eq!(failure.phase, Phase::StageOutputs);
    assert!(matches!(failure.error, LaunchError::Resolve(_)));
    assert!(!escape.exists());
    assert!(fixture.metadata.calls().is_empty());
}
