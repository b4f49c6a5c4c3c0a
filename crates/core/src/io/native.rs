//! Native single-band GeoTIFF reading/writing built on the `tiff` crate.
//!
//! Georeferencing is limited to ModelPixelScale + ModelTiepoint (north-up
//! grids). The CRS is carried as an EPSG code in the GeoKeyDirectory and
//! no-data in the GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::TiffError;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::{ColorType, Gray32Float, GrayI32};
use tiff::tags::Tag;

// The decoder maps these codes to named variants, so lookups must use them
const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

// GeoKey ids
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

/// Sample type written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// 32-bit float, NaN as no-data (continuous layers, distances)
    #[default]
    Float32,
    /// 32-bit signed integer, `i32::MIN` as no-data (class codes)
    Int32,
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    pub sample_format: SampleFormat,
    /// Also write an ESRI world file (`.tfw`) next to the image
    pub world_file: bool,
}

fn tiff_err(context: &'static str) -> impl Fn(TiffError) -> Error {
    move |e| Error::Other(format!("{}: {}", context, e))
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?
    {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ));
        }
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Some(nodata) = read_nodata::<T, R>(&mut decoder) {
        raster.set_nodata(Some(nodata));
    }
    raster.set_crs(read_crs(&mut decoder));

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code from ProjectedCSTypeGeoKey or GeographicTypeGeoKey
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY).ok()?;
    crs_from_geokeys(&keys)
}

/// Directory layout: `[version, revision, minor, count]` then `count`
/// entries of `[key, location, count, value]`. Only inline values
/// (location 0) are read.
fn crs_from_geokeys(keys: &[u16]) -> Option<CRS> {
    let count = *keys.get(3)? as usize;
    keys.get(4..)?
        .chunks_exact(4)
        .take(count)
        .find(|k| (k[0] == PROJECTED_CS_TYPE || k[0] == GEOGRAPHIC_TYPE) && k[1] == 0 && k[3] > 0)
        .map(|k| CRS::from_epsg(u32::from(k[3])))
}

/// GeoKeyDirectory for `crs`: EPSG codes 4000-4999 are written as
/// geographic, all others as projected. Codes above `u16::MAX` are dropped.
fn geokeys_for(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok());
    let geographic = epsg.is_some_and(|c| (4000..5000).contains(&c));

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE, 0, 1, if geographic { 2 } else { 1 }],
        // pixel-is-area
        [GT_RASTER_TYPE, 0, 1, 1],
    ];
    if let Some(code) = epsg {
        let key = if geographic { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        entries.push([key, 0, 1, code]);
    }

    // Version 1.1.0
    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

fn read_nodata<T: RasterElement, R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<T> {
    let text = decoder.get_tag_ascii_string(GDAL_NODATA).ok()?;
    let value: f64 = text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path)?;
    encode_geotiff(raster, file, options.sample_format)?;

    if options.world_file {
        let mut tfw = File::create(path.with_extension("tfw"))?;
        tfw.write_all(raster.transform().to_world_file().as_bytes())?;
    }
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(
    raster: &Raster<T>,
    sample_format: SampleFormat,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), sample_format)?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, format: SampleFormat) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    match format {
        SampleFormat::Float32 => {
            let data: Vec<f32> = raster
                .data()
                .iter()
                .map(|&v| {
                    if raster.is_nodata(v) {
                        f32::NAN
                    } else {
                        num_traits::cast(v).unwrap_or(f32::NAN)
                    }
                })
                .collect();
            encode_samples::<Gray32Float, T, W>(raster, writer, &data, "nan")
        }
        SampleFormat::Int32 => {
            let data: Vec<i32> = raster
                .data()
                .iter()
                .map(|&v| {
                    if raster.is_nodata(v) {
                        i32::MIN
                    } else {
                        v.to_f64().map_or(i32::MIN, |f| i32::from_f64(f.round()))
                    }
                })
                .collect();
            encode_samples::<GrayI32, T, W>(raster, writer, &data, &i32::MIN.to_string())
        }
    }
}

fn encode_samples<C, T, W>(
    raster: &Raster<T>,
    writer: W,
    data: &[C::Inner],
    nodata: &str,
) -> Result<()>
where
    C: ColorType,
    [C::Inner]: tiff::encoder::TiffValue,
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();

    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(MODEL_PIXEL_SCALE, &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(MODEL_TIEPOINT, &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    let geokeys = geokeys_for(raster.crs());
    image
        .encoder()
        .write_tag(GEO_KEY_DIRECTORY, &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    image
        .encoder()
        .write_tag(GDAL_NODATA, nodata)
        .map_err(tiff_err("Cannot write nodata tag"))?;

    image
        .write_data(data)
        .map_err(tiff_err("Cannot write image data"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landcover() -> Raster<f64> {
        let mut r = Raster::from_vec(vec![41.0, 42.0, f64::NAN, 201.0], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(500_000.0, 7_000_000.0, 10.0, -10.0));
        r.set_nodata(Some(f64::NAN));
        r.set_crs(Some(CRS::sweref99_tm()));
        r
    }

    #[test]
    fn test_file_roundtrip_keeps_grid_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smd_25m.tif");
        let mut smd = Raster::from_vec(vec![59.0, 0.0, 0.0, 59.0, 1.0, 2.0], 2, 3).unwrap();
        smd.set_transform(GeoTransform::new(500_000.0, 7_000_000.0, 25.0, -25.0));
        smd.set_crs(Some(CRS::sweref99_tm()));
        write_geotiff(&smd, &path, &GeoTiffOptions::default()).unwrap();

        let back: Raster<f64> = read_geotiff(&path).unwrap();
        let gt = back.transform();
        assert_eq!((gt.origin_x, gt.origin_y), (500_000.0, 7_000_000.0));
        assert_eq!(gt.resolution(), (25.0, 25.0));
        assert!(back.nodata().is_some_and(f64::is_nan));
        assert_eq!(back.crs().and_then(CRS::epsg), Some(3006));
        assert!(back.grid_difference(&smd).is_none());

        let mut nmd = smd.clone();
        nmd.set_transform(GeoTransform::new(500_000.0, 7_000_000.0, 10.0, -10.0));
        assert!(matches!(
            back.ensure_same_grid("smd", &nmd, "nmd"),
            Err(Error::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_geokeys_epsg() {
        let keys = geokeys_for(Some(&CRS::sweref99_tm()));
        assert_eq!(keys[3], 3);
        assert_eq!(crs_from_geokeys(&keys).and_then(|c| c.epsg()), Some(3006));

        let wgs84 = geokeys_for(Some(&CRS::from_epsg(4326)));
        assert!(wgs84.chunks_exact(4).skip(1).any(|k| k == [GEOGRAPHIC_TYPE, 0, 1, 4326]));
        assert!(wgs84.chunks_exact(4).skip(1).any(|k| k == [GT_MODEL_TYPE, 0, 1, 2]));

        assert!(crs_from_geokeys(&geokeys_for(None)).is_none());
    }

    #[test]
    fn test_float_roundtrip_keeps_georef_and_nodata() {
        let buf = write_geotiff_to_buffer(&landcover(), SampleFormat::Float32).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.get(0, 1).unwrap(), 42.0);
        assert!(back.get(1, 0).unwrap().is_nan());
        assert_eq!(back.transform().origin_x, 500_000.0);
        assert_eq!(back.transform().pixel_height, -10.0);
        assert_eq!(back.crs().and_then(CRS::epsg), Some(3006));
    }

    #[test]
    fn test_int_roundtrip_maps_nodata_sentinel() {
        let buf = write_geotiff_to_buffer(&landcover(), SampleFormat::Int32).unwrap();
        let back: Raster<i32> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.get(1, 1).unwrap(), 201);
        assert_eq!(back.nodata(), Some(i32::MIN));
        assert!(back.to_f64_grid().get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_world_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landcover.tif");
        let options = GeoTiffOptions {
            world_file: true,
            ..Default::default()
        };
        write_geotiff(&landcover(), &path, &options).unwrap();

        let tfw = std::fs::read_to_string(dir.path().join("landcover.tfw")).unwrap();
        assert_eq!(tfw.lines().next(), Some("10"));
    }
}
