use ndarray::{ArrayD, IxDyn};
use zarrs_mzarr::container::Container;
use zarrs_mzarr::{AxisSlice, ElementType, Error, Mzarr, OpenMode, SaveOptions, Selection};

mod common;
use common::{pattern_f32, scratch};

#[test]
fn mutate_in_memory() {
    let mut handle = Mzarr::from(ArrayD::<f32>::zeros(IxDyn(&[5, 10])));
    handle.fill(Selection::index(0), 2.0f32).unwrap();
    handle
        .fill(
            Selection::new(vec![AxisSlice::Full, AxisSlice::Range(4..7)]),
            3.0f32,
        )
        .unwrap();

    let array = handle.to_array::<f32>().unwrap();
    assert_eq!(array[[0, 0]], 2.0);
    assert_eq!(array[[0, 4]], 3.0);
    assert_eq!(array[[4, 6]], 3.0);
    assert_eq!(array[[4, 7]], 0.0);
    assert_eq!(array[[1, 3]], 0.0);
    assert!(!handle.is_dirty());
    assert!(handle.as_volume().is_some());
}

#[test]
fn save_then_load() {
    let dir = scratch();
    let path = dir.path().join("constant.mzarr");
    let data = ArrayD::from_elem(IxDyn(&[20, 30, 3]), 5.4333f32);
    let mut handle = Mzarr::from(data.clone());
    assert!(handle.chunked_array().is_none());
    handle.save(&path, &SaveOptions::default()).unwrap();
    assert_eq!(handle.path(), Some(path.as_path()));
    assert_eq!(handle.chunked_array().unwrap().shape(), &[20, 30, 3]);
    handle.close().unwrap();

    let loaded = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(loaded.element_type(), ElementType::Float32);
    assert_eq!(loaded.ndim(), 3);
    assert_eq!(loaded.to_array::<f32>().unwrap(), data);
}

#[test]
fn get_selections() {
    let data = pattern_f32(&[3, 4]);
    let handle = Mzarr::from(data.clone());
    let row = handle.get_typed::<f32>(Selection::index(1)).unwrap();
    assert_eq!(row.shape(), &[4]);
    assert_eq!(row[[2]], data[[1, 2]]);

    let block = handle
        .get(Selection::new(vec![AxisSlice::Range(1..3), AxisSlice::Index(3)]))
        .unwrap();
    assert_eq!(block.shape(), &[2]);
    assert_eq!(block.as_array::<f32>().unwrap()[[1]], data[[2, 3]]);

    assert!(matches!(
        handle.get(Selection::index(3)),
        Err(Error::InvalidSelection(_))
    ));
}

#[test]
fn writes_to_saved_container() {
    let dir = scratch();
    let path = dir.path().join("mutable.mzarr");
    let data = pattern_f32(&[8, 8]);
    let mut handle = Mzarr::from(data.clone());
    handle.save(&path, &SaveOptions::default()).unwrap();

    handle
        .fill(Selection::new(vec![AxisSlice::Range(2..4), AxisSlice::Full]), -1.0f32)
        .unwrap();
    assert!(handle.is_dirty());
    assert_eq!(handle.get_typed::<f32>([3u64, 5]).unwrap().into_raw_vec_and_offset().0, vec![-1.0]);

    // not yet flushed
    let before = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(before.to_array::<f32>().unwrap(), data);
    drop(before);

    handle.flush().unwrap();
    assert!(!handle.is_dirty());

    let mut reopened = Mzarr::open(&path, OpenMode::ReadWriteExisting).unwrap();
    let array = reopened.to_array::<f32>().unwrap();
    assert_eq!(array[[2, 0]], -1.0);
    assert_eq!(array[[3, 7]], -1.0);
    assert_eq!(array[[4, 0]], data[[4, 0]]);

    let values = ArrayD::from_elem(IxDyn(&[2, 2]), 9.0f32);
    reopened
        .set(Selection::new(vec![AxisSlice::Range(0..2), AxisSlice::Range(0..2)]), &values)
        .unwrap();
    reopened.close().unwrap();

    // coarser levels are only rebuilt by save
    let container = Container::open(&path).unwrap();
    assert_eq!(container.level("subsampled_1").unwrap().shape(), &[4, 4]);
    let loaded = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(loaded.to_array::<f32>().unwrap()[[1, 1]], 9.0);
}

#[test]
fn resave_to_same_path() {
    let dir = scratch();
    let path = dir.path().join("resave.mzarr");
    let mut handle = Mzarr::from(ArrayD::<u8>::zeros(IxDyn(&[6, 6])));
    handle.save(&path, &SaveOptions::default()).unwrap();
    handle.fill(Selection::all(), 7u8).unwrap();
    handle.save(&path, &SaveOptions::default()).unwrap();
    assert!(!handle.is_dirty());

    let container = Container::open(&path).unwrap();
    let level = container.level("subsampled_1").unwrap();
    let coarse = level
        .retrieve_array_subset::<Vec<u8>>(&level.subset_all())
        .unwrap();
    assert!(coarse.iter().all(|&v| v == 7));
}

#[test]
fn failed_resave_keeps_unflushed_changes() {
    let dir = scratch();
    let path = dir.path().join("kept.mzarr");
    let mut handle = Mzarr::from(ArrayD::<u8>::zeros(IxDyn(&[4, 4])));
    handle.save(&path, &SaveOptions::default()).unwrap();
    handle.fill(Selection::all(), 9u8).unwrap();

    let err = handle
        .save(&path, &SaveOptions::default().with_overwrite(false))
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    let err = handle
        .save(&path, &SaveOptions::default().with_mode(OpenMode::ReadOnly))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOpenMode("r")));
    assert!(handle.is_dirty());
    assert_eq!(handle.to_array::<u8>().unwrap()[[0, 0]], 9);

    handle.flush().unwrap();
    let loaded = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(loaded.to_array::<u8>().unwrap().iter().all(|&v| v == 9));
}

#[test]
fn invalid_chunks_leave_container_in_place() {
    let dir = scratch();
    let path = dir.path().join("chunks.mzarr");
    let mut handle = Mzarr::from(ArrayD::<u8>::zeros(IxDyn(&[4, 4])));
    handle.save(&path, &SaveOptions::default()).unwrap();
    handle.fill(Selection::index(0), 9u8).unwrap();

    let err = handle
        .save(&path, &SaveOptions::default().with_chunks(vec![2]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChunkShape { .. }));
    let on_disk = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(on_disk.to_array::<u8>().unwrap()[[0, 0]], 0);
    drop(on_disk);

    assert!(handle.is_dirty());
    handle.close().unwrap();
    let loaded = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    let array = loaded.to_array::<u8>().unwrap();
    assert_eq!(array[[0, 3]], 9);
    assert_eq!(array[[1, 0]], 0);
}

#[test]
fn save_elsewhere_leaves_old_container() {
    let dir = scratch();
    let first = dir.path().join("first.mzarr");
    let second = dir.path().join("second.mzarr");
    let mut handle = Mzarr::from(ArrayD::<u8>::zeros(IxDyn(&[4, 4])));
    handle.save(&first, &SaveOptions::default()).unwrap();
    handle.fill(Selection::all(), 5u8).unwrap();
    handle.save(&second, &SaveOptions::default()).unwrap();
    assert!(!handle.is_dirty());
    assert_eq!(handle.path(), Some(second.as_path()));

    let old = Mzarr::open(&first, OpenMode::ReadOnly).unwrap();
    assert!(old.to_array::<u8>().unwrap().iter().all(|&v| v == 0));
    let new = Mzarr::open(&second, OpenMode::ReadOnly).unwrap();
    assert!(new.to_array::<u8>().unwrap().iter().all(|&v| v == 5));
}

#[test]
fn read_only_rejects_writes() {
    let dir = scratch();
    let path = dir.path().join("read_only.mzarr");
    let mut handle = Mzarr::from(pattern_f32(&[4, 4]));
    handle.save(&path, &SaveOptions::default()).unwrap();
    handle.close().unwrap();
    let before = std::fs::read(&path).unwrap();

    let mut handle = Mzarr::open(&path, OpenMode::ReadOnly).unwrap();
    let err = handle.fill(Selection::all(), 0.0f32).unwrap_err();
    assert!(matches!(err, Error::ReadOnly(p) if p == path));
    let values = ArrayD::<f32>::zeros(IxDyn(&[4]));
    assert!(matches!(
        handle.set(Selection::index(0), &values),
        Err(Error::ReadOnly(_))
    ));
    handle.close().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn rejects_mismatched_writes() {
    let mut handle = Mzarr::from(pattern_f32(&[4, 4]));
    assert!(matches!(
        handle.fill(Selection::all(), 1u16),
        Err(Error::ElementTypeMismatch {
            actual: "float32",
            requested: "uint16"
        })
    ));
    let wrong_size = ArrayD::<f32>::zeros(IxDyn(&[3]));
    assert!(matches!(
        handle.set(Selection::index(0), &wrong_size),
        Err(Error::ShapeMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert!(matches!(
        handle.to_array::<f64>(),
        Err(Error::ElementTypeMismatch { .. })
    ));
}

#[test]
fn open_rejects_create_modes() {
    let dir = scratch();
    let path = dir.path().join("modes.mzarr");
    let mut handle = Mzarr::from(pattern_f32(&[4, 4]));
    handle.save(&path, &SaveOptions::default()).unwrap();
    for mode in [OpenMode::CreateOverwrite, OpenMode::CreateExclusive] {
        assert!(matches!(
            Mzarr::open(&path, mode),
            Err(Error::InvalidOpenMode(_))
        ));
    }
    assert!(Mzarr::open(&path, OpenMode::ReadWriteCreate).is_ok());
}
