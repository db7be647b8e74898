//! Exercises [`CtlFs`] beyond the unit tests kept alongside it: directory
//! listing, attribute reporting, and the unbound-fid error path.

use ninep::ctl::CtlFs;
use ninep::fcall::{FCall, GetAttrMask, NONUNAME};
use ninep::srv::{FId, Filesystem};
use std::sync::Mutex;

fn root_fid() -> FId<Mutex<ninep::ctl::CtlState>> {
    FId::new(0, Mutex::new(Default::default()))
}

fn child_fid() -> FId<Mutex<ninep::ctl::CtlState>> {
    FId::new(1, Mutex::new(Default::default()))
}

#[tokio::test]
async fn readdir_lists_both_entries() {
    let fs = CtlFs::new();
    let root = root_fid();
    fs.rattach(&root, None, "nobody", "ctl", NONUNAME)
        .await
        .unwrap();

    let resp = fs.rreaddir(&root, 0, 4096).await.unwrap();
    let names: Vec<String> = match resp {
        FCall::RReadDir { data } => data.data().iter().map(|e| e.name.clone()).collect(),
        _ => panic!("expected RReadDir"),
    };
    assert_eq!(names, vec!["version".to_owned(), "build".to_owned()]);
}

#[tokio::test]
async fn readdir_resumes_from_offset() {
    let fs = CtlFs::new();
    let root = root_fid();
    fs.rattach(&root, None, "nobody", "ctl", NONUNAME)
        .await
        .unwrap();

    let resp = fs.rreaddir(&root, 1, 4096).await.unwrap();
    match resp {
        FCall::RReadDir { data } => {
            assert_eq!(data.data().len(), 1);
            assert_eq!(data.data()[0].name, "build");
        }
        _ => panic!("expected RReadDir"),
    }
}

#[tokio::test]
async fn getattr_reports_directory_and_file_modes() {
    let fs = CtlFs::new();
    let root = root_fid();
    fs.rattach(&root, None, "nobody", "ctl", NONUNAME)
        .await
        .unwrap();

    let leaf = child_fid();
    fs.rwalk(&root, &leaf, &["version".to_owned()])
        .await
        .unwrap();

    let dir_attr = fs.rgetattr(&root, GetAttrMask::BASIC).await.unwrap();
    match dir_attr {
        FCall::RGetAttr { stat, .. } => assert_eq!(stat.mode, 0o040_555),
        _ => panic!("expected RGetAttr"),
    }

    let file_attr = fs.rgetattr(&leaf, GetAttrMask::BASIC).await.unwrap();
    match file_attr {
        FCall::RGetAttr { stat, .. } => assert_eq!(stat.mode, 0o100_444),
        _ => panic!("expected RGetAttr"),
    }
}

#[tokio::test]
async fn operations_on_an_unbound_fid_fail_with_ebadf() {
    let fs = CtlFs::new();
    let fid = root_fid();

    let err = fs.rlopen(&fid, 0).await.unwrap_err();
    assert_eq!(err.errno(), nix::errno::Errno::EBADF);
}

#[tokio::test]
async fn reading_a_directory_fails_with_eisdir() {
    let fs = CtlFs::new();
    let root = root_fid();
    fs.rattach(&root, None, "nobody", "ctl", NONUNAME)
        .await
        .unwrap();

    let err = fs.rread(&root, 0, 4096).await.unwrap_err();
    assert_eq!(err.errno(), nix::errno::Errno::EISDIR);
}

#[tokio::test]
async fn listing_a_file_fails_with_enotdir() {
    let fs = CtlFs::new();
    let root = root_fid();
    fs.rattach(&root, None, "nobody", "ctl", NONUNAME)
        .await
        .unwrap();

    let leaf = child_fid();
    fs.rwalk(&root, &leaf, &["build".to_owned()]).await.unwrap();

    let err = fs.rreaddir(&leaf, 0, 4096).await.unwrap_err();
    assert_eq!(err.errno(), nix::errno::Errno::ENOTDIR);
}
