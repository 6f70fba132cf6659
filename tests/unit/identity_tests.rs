use std::fs;

use agent_supervisor::identity::{devhook_id_path, load_or_create_devhook_id};
use agent_supervisor::AppError;

#[test]
fn creates_identifier_on_first_access() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("nested").join("data");

    let id = load_or_create_devhook_id(&data_dir).expect("create id");

    assert!(uuid::Uuid::parse_str(&id).is_ok(), "id should be a uuid: {id}");
    assert_eq!(
        fs::read_to_string(devhook_id_path(&data_dir)).expect("id file"),
        id
    );
}

#[test]
fn reuses_existing_identifier() {
    let dir = tempfile::tempdir().expect("tempdir");

    let first = load_or_create_devhook_id(dir.path()).expect("first");
    let second = load_or_create_devhook_id(dir.path()).expect("second");

    assert_eq!(first, second);
}

#[test]
fn reads_identifier_written_by_another_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(devhook_id_path(dir.path()), "existing-id\n").expect("seed id");

    assert_eq!(
        load_or_create_devhook_id(dir.path()).expect("load"),
        "existing-id"
    );
}

#[test]
fn empty_identifier_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(devhook_id_path(dir.path()), "").expect("seed empty");

    let err = load_or_create_devhook_id(dir.path()).unwrap_err();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("empty")));
}

#[test]
fn leaves_only_the_identifier_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    load_or_create_devhook_id(dir.path()).expect("create");

    let names: Vec<String> = fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["devhook-id".to_owned()]);
}

#[test]
fn concurrent_first_callers_agree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");

    let ids: Vec<String> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| load_or_create_devhook_id(&data_dir).expect("id")))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("join"))
            .collect()
    });

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]), "ids: {ids:?}");
    assert_eq!(fs::read_dir(&data_dir).expect("read dir").count(), 1);
}

#[test]
fn failed_create_leaves_no_temporary_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    // A directory at the id path can be neither read nor replaced.
    fs::create_dir(devhook_id_path(dir.path())).expect("squat id path");

    assert!(load_or_create_devhook_id(dir.path()).is_err());
    assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 1);
}
