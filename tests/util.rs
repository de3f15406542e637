//! Shared fixtures for integration tests

#![allow(dead_code)]

use assert_fs::prelude::*;

/// Write a complete Relief export: the four base tables plus the custom
/// tables they reference (food_delivery, household, member).
pub fn make_relief_dir() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    let files = [
        (
            "authorizations.csv",
            "_id,name,status,type,custom_delivery_form_id\n\
             a1,Food parcel,ACTIVE,voucher,food_delivery\n\
             a2,Cash,ACTIVE,cash,\n",
        ),
        (
            "entitlements.csv",
            "_id,authorization_id,beneficiary_entity_id,status\n\
             e1,a1,b1,ACTIVE\n\
             e2,a2,b2,ACTIVE\n",
        ),
        (
            "beneficiary_entities.csv",
            "_id,beneficiary_entity_id,status,custom_beneficiary_entity_form_id\n\
             b1,BE-001,ENABLED,household\n\
             b2,BE-002,ENABLED,household\n",
        ),
        (
            "individuals.csv",
            "_id,beneficiary_entity_row_id,custom_member_form_id\n\
             i1,b1,member\n\
             i2,b1,member\n\
             i3,b2,member\n",
        ),
        ("food_delivery.csv", "_id,kg\nd1,5\n"),
        ("household.csv", "_id,size\nb1,4\nb2,2\n"),
        ("member.csv", "_id,age\ni1,30\ni2,4\ni3,51\n"),
    ];

    for (name, body) in files
    {
        tmp.child(name)
            .write_str(body)
            .expect("write table");
    }

    tmp
}

/// Rows across every table of [`make_relief_dir`].
pub const RELIEF_ROWS: usize = 15;
