use api_contract::{AssetDto, AssetTreeDto, CreateAssetRequest, MoveAssetRequest, RollupResultDto};
use std::collections::BTreeMap;

fn sample_asset(asset_id: &str) -> AssetDto {
    AssetDto {
        asset_id: asset_id.to_string(),
        parent_id: None,
        path: asset_id.to_string(),
        depth: 0,
        name: "Plant".to_string(),
        asset_type: "site".to_string(),
        status: "active".to_string(),
        location: None,
        metadata: BTreeMap::new(),
        tags: Vec::new(),
    }
}

#[test]
fn asset_dto_is_camel_case() {
    let value = serde_json::to_value(sample_asset("a-1")).expect("serialize");
    assert!(value.get("assetId").is_some());
    assert!(value.get("parentId").is_some());
    assert!(value.get("assetType").is_some());
    assert!(value.get("asset_id").is_none());
}

#[test]
fn create_asset_request_defaults_metadata_and_tags() {
    let payload = r#"{"parentId":null,"name":"Plant","assetType":"site"}"#;
    let req: CreateAssetRequest = serde_json::from_str(payload).expect("parse");
    assert!(req.metadata.is_empty());
    assert!(req.tags.is_empty());
    assert_eq!(req.asset_type, "site");
}

#[test]
fn move_request_accepts_null_parent() {
    let payload = r#"{"newParentId":null}"#;
    let req: MoveAssetRequest = serde_json::from_str(payload).expect("parse");
    assert!(req.new_parent_id.is_none());
}

#[test]
fn tree_dto_flattens_asset_and_skips_empty_children() {
    let tree = AssetTreeDto {
        asset: sample_asset("a-1"),
        children: Vec::new(),
    };
    let value = serde_json::to_value(tree).expect("serialize");
    assert!(value.get("assetId").is_some());
    assert!(value.get("children").is_none());
}

#[test]
fn rollup_result_dto_is_camel_case() {
    let dto = RollupResultDto {
        asset_id: "a-1".to_string(),
        metric_name: "temperature".to_string(),
        bucket_start_ms: 1_700_000_000_000,
        bucket_end_ms: 1_700_000_060_000,
        value: 23.0,
        sample_count: 2,
        aggregation: "average".to_string(),
        partial: false,
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert!(value.get("bucketStartMs").is_some());
    assert!(value.get("sampleCount").is_some());
    assert!(value.get("bucket_start_ms").is_none());
}
