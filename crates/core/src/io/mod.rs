//! Reading and writing raster files

mod native;

pub use native::{
    GeoTiffOptions, SampleFormat, read_geotiff, read_geotiff_from_buffer, write_geotiff,
    write_geotiff_to_buffer,
};
