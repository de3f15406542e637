//! Loading whole modules from a data directory

use anyhow::Result;
use assert_fs::prelude::*;

use relief_setup::core::loader::{Module, load_module, missing_required_files};
use relief_setup::core::repository::{CsvError, CsvRepository, FileCsvRepository};
use relief_setup::core::row::{Authorization, Individual, SyncRow};

mod util;
use util::{RELIEF_ROWS, make_relief_dir};

#[test]
fn relief_module_loads_base_and_custom_tables() -> Result<()>
{
    let dir = make_relief_dir();
    let repo = FileCsvRepository::new();

    let summary = load_module(dir.path(), Module::Relief, &repo)?;

    assert_eq!(summary.total_rows(), RELIEF_ROWS);

    let base: Vec<&str> = summary
        .tables
        .iter()
        .filter(|t| !t.custom)
        .map(|t| t.file.as_str())
        .collect();
    assert_eq!(
        base,
        vec!["authorizations.csv", "entitlements.csv", "beneficiary_entities.csv", "individuals.csv"]
    );

    let mut custom: Vec<&str> = summary
        .tables
        .iter()
        .filter(|t| t.custom)
        .map(|t| t.file.as_str())
        .collect();
    custom.sort();
    assert_eq!(custom, vec!["food_delivery.csv", "household.csv", "member.csv"]);

    let members = repo
        .indexed_untyped("member.csv")
        .expect("member table cached");
    assert_eq!(members.get("i2").and_then(|row| row.get("age")), Some("4"));

    let auths = repo
        .indexed_typed::<Authorization>()
        .expect("authorizations cached");
    assert_eq!(auths.get("a1").map(|a| a.authorization_type.as_str()), Some("voucher"));

    let individuals = repo
        .typed::<Individual>()
        .expect("individuals cached");
    let ids: Vec<&str> = individuals
        .rows()
        .iter()
        .map(SyncRow::row_id)
        .collect();
    assert_eq!(ids, vec!["i1", "i2", "i3"]);
    Ok(())
}

#[test]
fn missing_files_come_back_as_one_list()
{
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("individuals.csv")
        .write_str("_id\n")
        .expect("write");

    let missing = missing_required_files(dir.path(), Module::Relief);

    assert_eq!(
        missing,
        vec!["authorizations.csv", "entitlements.csv", "beneficiary_entities.csv"]
    );
    assert_eq!(missing_required_files(dir.path(), Module::Health), vec![
        "beneficiary_entities.csv",
        "visit_programs.csv"
    ]);
}

#[test]
fn reload_picks_up_changed_rows() -> Result<()>
{
    let dir = make_relief_dir();
    let repo = FileCsvRepository::new();
    load_module(dir.path(), Module::Relief, &repo)?;

    dir.child("household.csv")
        .write_str("_id,size\nb1,5\nb2,2\nb3,1\n")?;
    load_module(dir.path(), Module::Relief, &repo)?;

    let household = repo
        .indexed_untyped("household.csv")
        .expect("cached");
    assert_eq!(household.len(), 3);
    assert_eq!(household.get("b1").and_then(|row| row.get("size")), Some("5"));
    Ok(())
}

#[test]
fn missing_custom_table_names_the_file()
{
    let dir = make_relief_dir();
    std::fs::remove_file(dir.path().join("member.csv")).expect("remove");
    let repo = FileCsvRepository::new();

    let err = load_module(dir.path(), Module::Relief, &repo).unwrap_err();

    assert!(matches!(err, CsvError::Open { .. }));
    assert_eq!(err.key(), "member.csv");
}
