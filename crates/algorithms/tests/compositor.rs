//! Land cover compositing scenarios

use rengis_algorithms::compositor::{
    apply_stages, composite, run_batch, Comparison, Composite, LayerDescriptor, Predicate,
    RuleStage, Treatment,
};
use rengis_algorithms::distance::{euclidean_distance, DistanceParams};
use rengis_algorithms::reclass::ReclassTable;
use rengis_core::io::{read_geotiff, write_geotiff, GeoTiffOptions, SampleFormat};
use rengis_core::{Error, GeoTransform, Raster, Region, Workspace};
use std::collections::BTreeMap;

fn grid(values: Vec<f64>, rows: usize, cols: usize, res: f64) -> Raster<f64> {
    let mut r = Raster::from_vec(values, rows, cols).unwrap();
    r.set_transform(GeoTransform::new(500_000.0, 7_000_000.0, res, -res));
    r
}

fn grids(pairs: Vec<(&str, Raster<f64>)>) -> BTreeMap<String, Raster<f64>> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn tundra_stage() -> RuleStage {
    RuleStage::new(
        Predicate::current(Comparison::Eq(41.0))
            .and(Predicate::grid("landcover_smd", Comparison::Eq(59.0))),
        201,
    )
}

#[test]
fn tundra_from_aux_grid() {
    let base = grid(
        vec![41.0, 42.0, 41.0, 42.0, 41.0, 42.0, 41.0, 42.0, 41.0],
        3,
        3,
        10.0,
    );
    let aux = grid(
        vec![59.0, 0.0, 0.0, 0.0, 59.0, 59.0, 0.0, 0.0, 0.0],
        3,
        3,
        10.0,
    );
    let out = apply_stages(
        &base,
        "landcover_nmd",
        &[tundra_stage()],
        &grids(vec![("landcover_smd", aux)]),
    )
    .unwrap();

    let expected = [201.0, 42.0, 41.0, 42.0, 201.0, 42.0, 41.0, 42.0, 41.0];
    assert_eq!(out.data().iter().copied().collect::<Vec<_>>(), expected);
}

#[test]
fn later_stage_overrides_earlier_on_same_cell() {
    let base = grid(vec![42.0], 1, 1, 10.0);
    let stages = [
        RuleStage::new(Predicate::current(Comparison::Eq(42.0)), 202),
        RuleStage::new(Predicate::current(Comparison::In(vec![42.0, 202.0])), 41),
    ];
    let out = apply_stages(&base, "base", &stages, &grids(vec![])).unwrap();
    assert_eq!(out.get(0, 0).unwrap(), 41.0);
}

#[test]
fn different_resolutions_same_extent_mismatch() {
    let nmd = grid(vec![41.0; 25 * 25], 25, 25, 10.0);
    let smd = grid(vec![59.0; 10 * 10], 10, 10, 25.0);
    let a = nmd.ensure_same_grid("nmd", &smd, "smd");
    assert!(matches!(a, Err(Error::GridMismatch { .. })));

    let staged = apply_stages(&nmd, "nmd", &[tundra_stage()], &grids(vec![("landcover_smd", smd)]));
    assert!(matches!(staged, Err(Error::GridMismatch { .. })));
}

#[test]
fn distance_from_single_feature_cell() {
    let mut features = grid(vec![f64::NAN; 30 * 30], 30, 30, 10.0);
    features.set(0, 0, 1.0).unwrap();
    let result = euclidean_distance(&features, &DistanceParams::default()).unwrap();

    assert_eq!(result.distance.get(0, 0).unwrap(), 0.0);
    for d in [1usize, 5, 29] {
        assert_eq!(result.distance.get(0, d).unwrap(), d as f64 * 10.0);
        assert_eq!(result.distance.get(d, 0).unwrap(), d as f64 * 10.0);
    }
}

#[test]
fn full_landcover_recipe() {
    let nan = f64::NAN;
    let region_grid = grid(vec![0.0; 6], 2, 3, 10.0);
    let mut ws = Workspace::new(Region::from_raster(&region_grid));
    ws.insert("nmd", grid(vec![111.0, 41.0, 42.0, 42.0, 41.0, 41.0], 2, 3, 10.0))
        .unwrap();
    ws.insert("smd", grid(vec![0.0, 59.0, 52.0, 17.0, 0.0, 0.0], 2, 3, 10.0))
        .unwrap();
    ws.insert("urban", grid(vec![nan; 6], 2, 3, 10.0)).unwrap();
    ws.insert("agri_jbv", grid(vec![nan, nan, nan, nan, 1.0, nan], 2, 3, 10.0))
        .unwrap();
    ws.insert("agri_smd", grid(vec![nan; 6], 2, 3, 10.0)).unwrap();

    let table = ReclassTable::parse("111 thru 118 = 1 Forest\n41 = 41 Other open land\n42 = 42 Open land\n").unwrap();
    let recipe = Composite {
        table: Some(table),
        stages: vec![
            tundra_stage_named("smd"),
            RuleStage::new(
                Predicate::current(Comparison::Eq(42.0)).and(Predicate::grid("smd", Comparison::Eq(52.0))),
                202,
            ),
            RuleStage::new(
                Predicate::not_null("urban").or(Predicate::grid("smd", Comparison::Eq(17.0))),
                51,
            ),
            RuleStage::new(Predicate::current(Comparison::Eq(42.0)), 41),
            RuleStage::new(
                Predicate::current(Comparison::Eq(41.0))
                    .and(Predicate::not_null("agri_jbv").or(Predicate::not_null("agri_smd"))),
                3,
            ),
        ],
        report: true,
        ..Default::default()
    };

    let report = composite(&mut ws, "nmd", "landcover", &recipe).unwrap().unwrap();
    let out = ws.raster("landcover").unwrap();
    let values: Vec<f64> = out.data().iter().copied().collect();
    assert_eq!(values, vec![1.0, 201.0, 202.0, 51.0, 3.0, 41.0]);
    assert_eq!(report.total_cells, 6);
    assert_eq!(report.row(1).unwrap().label, "Forest");
}

fn tundra_stage_named(aux: &str) -> RuleStage {
    RuleStage::new(
        Predicate::current(Comparison::Eq(41.0)).and(Predicate::grid(aux, Comparison::Eq(59.0))),
        201,
    )
}

#[test]
fn batch_skips_failed_layer_and_exports_rest() {
    let nan = f64::NAN;
    let region_grid = grid(vec![0.0; 9], 3, 3, 10.0);
    let mut ws = Workspace::new(Region::from_raster(&region_grid));
    ws.insert("roads", grid(vec![1.0, nan, nan, nan, nan, nan, nan, nan, nan], 3, 3, 10.0))
        .unwrap();
    ws.insert("nmd", grid(vec![41.0; 9], 3, 3, 10.0)).unwrap();
    ws.insert("smd_25m", grid(vec![59.0; 4], 2, 2, 25.0)).unwrap();

    let layers = vec![
        LayerDescriptor::new("roads", "dist_roads", Treatment::Distance(DistanceParams::default())),
        LayerDescriptor::new(
            "nmd",
            "landcover",
            Treatment::Reclassify(Box::new(Composite {
                stages: vec![tundra_stage_named("smd_25m")],
                ..Default::default()
            })),
        ),
        LayerDescriptor::new("nmd", "nmd_cut", Treatment::Cut),
    ];
    let summary = run_batch(&mut ws, None, &layers);
    assert_eq!(summary.failed_names(), vec!["landcover"]);
    assert!(matches!(summary.failed[0].error, Error::GridMismatch { .. }));

    let dir = tempfile::tempdir().unwrap();
    for outcome in &summary.succeeded {
        let path = dir.path().join(format!("{}.tif", outcome.layer));
        write_geotiff(ws.raster(&outcome.layer).unwrap(), &path, &GeoTiffOptions::default()).unwrap();
    }

    let dist: Raster<f64> = read_geotiff(dir.path().join("dist_roads.tif")).unwrap();
    assert_eq!(dist.get(2, 2).unwrap() as f32, (800.0f64).sqrt() as f32);
    let options = GeoTiffOptions {
        sample_format: SampleFormat::Int32,
        world_file: true,
    };
    write_geotiff(ws.raster("nmd_cut").unwrap(), dir.path().join("nmd_int.tif"), &options).unwrap();
    assert!(dir.path().join("nmd_int.tfw").exists());
}
