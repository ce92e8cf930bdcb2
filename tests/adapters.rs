use std::path::PathBuf;

use image::{ImageBuffer, Luma};
use zarrs_mzarr::adapters::{
    ExtensionSpec, NiftiAdapter, NpyAdapter, SourceAdapter, SourceFormat, TiffStackAdapter,
    list_files,
};
use zarrs_mzarr::{ElementType, Error};

mod common;
use common::{f32_bytes, i16_bytes, nifti_bytes, npy_bytes, scratch, write_nifti};

#[test]
fn nifti_segmentation_is_rounded() {
    let dir = scratch();
    let path = dir.path().join("labels.nii");
    let bytes = nifti_bytes(
        &[4],
        16,
        32,
        &[1.0],
        (0.0, 0.0),
        &f32_bytes(&[0.0, 0.9, 1.1, 2.0]),
    );
    write_nifti(&path, &bytes, false);

    let image = NiftiAdapter.load_segmentation(&path).unwrap();
    let values = image.volume.as_array::<f32>().unwrap();
    assert_eq!(values.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 1.0, 2.0]);

    let raw = NiftiAdapter.load(&path).unwrap();
    assert_eq!(raw.volume.as_array::<f32>().unwrap()[[1]], 0.9);
}

#[test]
fn nifti_axes_are_reversed() {
    let dir = scratch();
    let values: Vec<i16> = (0..24).collect();
    let bytes = nifti_bytes(&[4, 3, 2], 4, 16, &[0.5, 0.75, 2.0], (0.0, 0.0), &i16_bytes(&values));
    for (name, gzip) in [("volume.nii", false), ("volume.nii.gz", true)] {
        let path = dir.path().join(name);
        write_nifti(&path, &bytes, gzip);

        let image = NiftiAdapter.load(&path).unwrap();
        assert_eq!(image.volume.element_type(), ElementType::Int16);
        assert_eq!(image.volume.shape(), &[2, 3, 4]);
        let array = image.volume.as_array::<i16>().unwrap();
        assert_eq!(array[[1, 2, 3]], 12 + 2 * 4 + 3);
        assert_eq!(array[[0, 1, 0]], 4);
        assert_eq!(image.spacing, vec![0.5, 0.75, 2.0]);
        assert_eq!(image.header.get("descrip").map(String::as_str), Some("test"));
        assert!(image.affine.is_none());
    }
}

#[test]
fn nifti_scaling_produces_floats() {
    let dir = scratch();
    let path = dir.path().join("scaled.nii");
    let bytes = nifti_bytes(&[3], 4, 16, &[1.0], (2.0, 1.0), &i16_bytes(&[0, 1, -3]));
    write_nifti(&path, &bytes, false);

    let image = NiftiAdapter.load(&path).unwrap();
    assert_eq!(image.volume.element_type(), ElementType::Float32);
    let values = image.volume.as_array::<f32>().unwrap();
    assert_eq!(values.iter().copied().collect::<Vec<_>>(), vec![1.0, 3.0, -5.0]);
}

#[test]
fn nifti_rejects_truncated_data() {
    let dir = scratch();
    let path = dir.path().join("short.nii");
    let bytes = nifti_bytes(&[4, 4], 16, 32, &[1.0, 1.0], (0.0, 0.0), &f32_bytes(&[1.0; 3]));
    write_nifti(&path, &bytes, false);
    assert!(matches!(
        NiftiAdapter.load(&path),
        Err(Error::UnsupportedSource { .. })
    ));

    let garbage = dir.path().join("garbage.nii");
    std::fs::write(&garbage, vec![7u8; 400]).unwrap();
    assert!(matches!(
        NiftiAdapter.load(&garbage),
        Err(Error::UnsupportedSource { .. })
    ));
}

#[test]
fn nifti_rejects_oversized_dims() {
    let dir = scratch();
    let path = dir.path().join("huge.nii");
    let bytes = nifti_bytes(&[i16::MAX; 7], 16, 32, &[1.0; 7], (0.0, 0.0), &[]);
    write_nifti(&path, &bytes, false);
    let err = NiftiAdapter.load(&path).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSource { path: p, .. } if p == path));
}

#[test]
fn npy_c_and_fortran_order() {
    let dir = scratch();
    let values: Vec<f32> = (0..6).map(|v| v as f32).collect();

    let c_path = dir.path().join("c.npy");
    std::fs::write(&c_path, npy_bytes("<f4", false, &[2, 3], &f32_bytes(&values))).unwrap();
    let c = NpyAdapter.load(&c_path).unwrap();
    assert_eq!(c.volume.shape(), &[2, 3]);
    assert_eq!(c.volume.as_array::<f32>().unwrap()[[1, 0]], 3.0);
    assert_eq!(c.header.get("fortran_order").map(String::as_str), Some("false"));
    assert_eq!(c.spacing, vec![1.0, 1.0]);

    // column-major: element [i, j] is at i + 2 * j
    let f_path = dir.path().join("f.npy");
    std::fs::write(&f_path, npy_bytes("<f4", true, &[2, 3], &f32_bytes(&values))).unwrap();
    let f = NpyAdapter.load(&f_path).unwrap();
    let array = f.volume.as_array::<f32>().unwrap();
    assert_eq!(f.volume.shape(), &[2, 3]);
    assert_eq!(array[[1, 0]], 1.0);
    assert_eq!(array[[0, 2]], 4.0);
    assert!(array.is_standard_layout());
}

#[test]
fn npy_integer_types() {
    let dir = scratch();
    let path = dir.path().join("ints.npy");
    std::fs::write(&path, npy_bytes("<i2", false, &[3], &i16_bytes(&[-1, 0, 300]))).unwrap();
    let image = NpyAdapter.load(&path).unwrap();
    assert_eq!(image.volume.element_type(), ElementType::Int16);
    assert_eq!(image.volume.as_array::<i16>().unwrap()[[2]], 300);
}

#[test]
fn listing_is_natural_and_strips_extensions() {
    let dir = scratch();
    for name in ["img10.nii.gz", "img2.nii", "img1.nii.gz", "notes.txt"] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }
    std::fs::create_dir(dir.path().join("img3.nii")).unwrap();

    let spec: ExtensionSpec = "nii.gz,.nii".parse().unwrap();
    let names = list_files(dir.path(), Some(&spec), false, false).unwrap();
    assert_eq!(
        names,
        ["img1", "img2", "img10"].map(PathBuf::from).to_vec()
    );

    let full = list_files(dir.path(), Some(&spec), true, true).unwrap();
    assert_eq!(full[2], dir.path().join("img10.nii.gz"));

    let all = list_files(dir.path(), None, false, false).unwrap();
    assert_eq!(all.len(), 4);

    let entries = NiftiAdapter.discover(dir.path()).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["img1", "img2", "img10"]);

    assert!(matches!(
        ExtensionSpec::new(["nii", ""]),
        Err(Error::InvalidExtensionSpec(_))
    ));
    assert!(matches!(
        ExtensionSpec::new(Vec::<String>::new()),
        Err(Error::InvalidExtensionSpec(_))
    ));
}

#[test]
fn tiff_slices_are_stacked_in_natural_order() {
    let dir = scratch();
    let stack = dir.path().join("stack");
    std::fs::create_dir(&stack).unwrap();
    for z in [1u16, 2, 10] {
        let slice = ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(5, 4, |x, y| {
            Luma([z * 1000 + (y * 5 + x) as u16])
        });
        slice.save(stack.join(format!("slice_{z}.tif"))).unwrap();
    }

    let adapter = SourceFormat::TiffStack.adapter();
    assert!(adapter.is_source(&stack));
    let image = adapter.load(&stack).unwrap();
    assert_eq!(image.volume.shape(), &[3, 4, 5]);
    let array = image.volume.as_array::<u16>().unwrap();
    assert_eq!(array[[0, 0, 0]], 1000);
    assert_eq!(array[[1, 3, 4]], 2019);
    assert_eq!(array[[2, 1, 2]], 10007);

    let entries = TiffStackAdapter.discover(dir.path()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "stack");
}

#[test]
fn source_format_names() {
    assert_eq!("NIfTI".parse::<SourceFormat>().unwrap(), SourceFormat::Nifti);
    assert_eq!("tif".parse::<SourceFormat>().unwrap(), SourceFormat::TiffStack);
    assert!("dicom".parse::<SourceFormat>().is_err());
}
