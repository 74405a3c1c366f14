use std::io::Cursor;
use std::sync::Arc;

use tempfile::TempDir;

use premise_intake::workflows::premises::adapters::{
    GazetteerValidator, InMemoryPremiseStore, KeywordOccupancyClassifier, LexicalSimilarityScorer,
    OccupancyTaxonomy,
};
use premise_intake::workflows::premises::{
    BatchRunner, DrainHandle, ErrorReason, OutcomeWriter, PipelineConfig, PremiseCsvReader,
    PremiseId, PremiseServices, RowId, RowOutcome, RowPipeline,
};

const INPUT: &str = "Business Name,Business Type,Address,City,State,Zip\n\
Schenes Inc,Grocery Store,1860 Millertown Rd,Auburn,CA,95603\n\
Old Mill Cafe,Restaurant,100 Main St,Grass Valley,CA,95945\n\
Mystery Shop,Retail,1 Nowhere Ln,Auburn,CA,95603\n\
Desert Store,Retail,5 Strip Blvd,Las Vegas,NV,89101\n\
,Retail,,Auburn,CA,95603\n";

const GAZETTEER: &str = "address_line,city,state_code,postal_code,latitude,longitude,place_name,place_type\n\
1860 Millertown Road,Auburn,CA,95603,38.9305,-121.0890,Schenes,grocery store\n\
100 Main Street,Grass Valley,CA,95945,39.2190,-121.0610,,\n\
5 Strip Blvd,Las Vegas,NV,89101,36.1700,-115.1400,,\n";

const STORE: &str = "id,premise_name,address_line_1,city,state_code,latitude,longitude,business_type\n\
501,Schenes,1860 Millertown Road,Auburn,CA,38.9305,-121.0890,Grocery Store\n\
502,Gold Country Bank,200 Main Street,Grass Valley,CA,39.2400,-121.0600,Bank\n";

const TAXONOMY: &str = "state_code,category,keywords\n\
CA,Assembly,restaurant;cafe;bar\n\
CA,Mercantile,store;grocery;retail\n\
CA,Business,bank;office\n";

fn runner() -> BatchRunner {
    let validator = GazetteerValidator::from_reader(Cursor::new(GAZETTEER)).expect("gazetteer");
    let store = InMemoryPremiseStore::from_reader(Cursor::new(STORE)).expect("store");
    let taxonomy = OccupancyTaxonomy::from_reader(Cursor::new(TAXONOMY)).expect("taxonomy");

    let services = PremiseServices::new(
        Arc::new(validator),
        Arc::new(store),
        Arc::new(LexicalSimilarityScorer),
        Arc::new(KeywordOccupancyClassifier::new(Arc::new(taxonomy))),
    );
    BatchRunner::new(RowPipeline::new(services, PipelineConfig::default()))
}

fn error_causes(outcomes: &[RowOutcome]) -> Vec<(u64, ErrorReason, String)> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            RowOutcome::Errored { record, error } => {
                Some((record.row_id.0, error.reason, error.cause.clone()))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn offline_batch_partitions_and_exports_every_row() {
    let records = PremiseCsvReader::from_reader(Cursor::new(INPUT)).expect("input parses");
    assert_eq!(records.len(), 5);

    let result = runner()
        .execute(records, &DrainHandle::new())
        .await
        .expect("store is healthy");

    assert_eq!(result.total(), 5);
    let summary = result.summary();
    assert_eq!((summary.accepted, summary.errored, summary.duplicates), (1, 3, 1));

    match &result.duplicates[0] {
        RowOutcome::Duplicate {
            record,
            matched_premise_id,
            similarity,
            ..
        } => {
            assert_eq!(record.row_id, RowId(2));
            assert_eq!(*matched_premise_id, PremiseId(501));
            assert!(*similarity >= 0.8, "similarity {similarity}");
        }
        other => panic!("expected duplicate, got {other:?}"),
    }

    match &result.accepted[0] {
        RowOutcome::Accepted {
            standardized_name,
            address,
            occupancy,
            ..
        } => {
            assert_eq!(standardized_name, "Old Mill Cafe");
            assert_eq!(address.address_line, "100 Main Street");
            assert_eq!(occupancy.category, "Assembly");
        }
        other => panic!("expected accepted, got {other:?}"),
    }

    assert_eq!(
        error_causes(&result.errored),
        vec![
            (4, ErrorReason::InvalidAddress, "no_match".to_string()),
            (
                5,
                ErrorReason::ClassificationFailed,
                "unsupported_jurisdiction".to_string()
            ),
            (6, ErrorReason::InvalidAddress, "missing_fields".to_string()),
        ]
    );

    let dir = TempDir::new().expect("temp dir");
    let paths = OutcomeWriter::write_to_dir(dir.path(), &result).expect("export succeeds");

    let accepted = std::fs::read_to_string(&paths.accepted).expect("accepted file");
    let errors = std::fs::read_to_string(&paths.errors).expect("errors file");
    let duplicates = std::fs::read_to_string(&paths.duplicates).expect("duplicates file");
    assert_eq!(accepted.lines().count(), 2);
    assert_eq!(errors.lines().count(), 4);
    assert_eq!(duplicates.lines().count(), 2);
    assert!(accepted.starts_with("Row Id,Premise Name"));
    assert!(duplicates.contains("501"));
}
