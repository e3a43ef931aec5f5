use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::candle::Candle;
use crate::error::PoolDataError;

/// Decimal columns are stored as UTF-8 strings to preserve precision.
pub fn candle_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "bucket_start",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("open", DataType::Utf8, false),
        Field::new("high", DataType::Utf8, false),
        Field::new("low", DataType::Utf8, false),
        Field::new("close", DataType::Utf8, false),
        Field::new("volume", DataType::Utf8, false),
        Field::new("trade_count", DataType::Int64, false),
    ])
}

pub fn candles_to_record_batch(candles: &[Candle]) -> Result<RecordBatch, PoolDataError> {
    let schema = Arc::new(candle_schema());

    let timestamps: Vec<i64> = candles
        .iter()
        .map(|c| c.bucket_start.timestamp_micros())
        .collect();

    let opens: Vec<String> = candles.iter().map(|c| c.open.to_string()).collect();
    let highs: Vec<String> = candles.iter().map(|c| c.high.to_string()).collect();
    let lows: Vec<String> = candles.iter().map(|c| c.low.to_string()).collect();
    let closes: Vec<String> = candles.iter().map(|c| c.close.to_string()).collect();
    let volumes: Vec<String> = candles.iter().map(|c| c.volume.to_string()).collect();
    let trade_counts: Vec<i64> = candles.iter().map(|c| c.trade_count).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
        Arc::new(StringArray::from(
            opens.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
        )),
        Arc::new(StringArray::from(
            highs.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
        )),
        Arc::new(StringArray::from(
            lows.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
        )),
        Arc::new(StringArray::from(
            closes.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
        )),
        Arc::new(StringArray::from(
            volumes.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
        )),
        Arc::new(Int64Array::from(trade_counts)),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

pub fn record_batch_to_candles(batch: &RecordBatch) -> Result<Vec<Candle>, PoolDataError> {
    let timestamps = batch
        .column(0)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .ok_or_else(|| PoolDataError::InvalidData("expected bucket_start column".into()))?;

    let opens = batch
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PoolDataError::InvalidData("expected open column".into()))?;

    let highs = batch
        .column(2)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PoolDataError::InvalidData("expected high column".into()))?;

    let lows = batch
        .column(3)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PoolDataError::InvalidData("expected low column".into()))?;

    let closes = batch
        .column(4)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PoolDataError::InvalidData("expected close column".into()))?;

    let volumes = batch
        .column(5)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PoolDataError::InvalidData("expected volume column".into()))?;

    let trade_counts = batch
        .column(6)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| PoolDataError::InvalidData("expected trade_count column".into()))?;

    let mut candles = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let micros = timestamps.value(i);
        let bucket_start = chrono::DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| PoolDataError::InvalidData(format!("invalid timestamp: {micros}")))?;

        let open = opens
            .value(i)
            .parse()
            .map_err(|e| PoolDataError::InvalidData(format!("invalid open: {e}")))?;
        let high = highs
            .value(i)
            .parse()
            .map_err(|e| PoolDataError::InvalidData(format!("invalid high: {e}")))?;
        let low = lows
            .value(i)
            .parse()
            .map_err(|e| PoolDataError::InvalidData(format!("invalid low: {e}")))?;
        let close = closes
            .value(i)
            .parse()
            .map_err(|e| PoolDataError::InvalidData(format!("invalid close: {e}")))?;
        let volume = volumes
            .value(i)
            .parse()
            .map_err(|e| PoolDataError::InvalidData(format!("invalid volume: {e}")))?;
        let trade_count = trade_counts.value(i);

        candles.push(Candle {
            bucket_start,
            open,
            high,
            low,
            close,
            volume,
            trade_count,
        });
    }

    Ok(candles)
}

pub fn write_parquet(path: &Path, candles: &[Candle]) -> Result<(), PoolDataError> {
    let batch = candles_to_record_batch(candles)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Vec<Candle>, PoolDataError> {
    let file = std::fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;

    let mut all_candles = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut candles = record_batch_to_candles(&batch)?;
        all_candles.append(&mut candles);
    }

    Ok(all_candles)
}

pub fn write_csv(path: &Path, candles: &[Candle]) -> Result<(), PoolDataError> {
    let batch = candles_to_record_batch(candles)?;

    let file = std::fs::File::create(path)?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(file);
    writer.write(&batch)?;

    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<Candle>, PoolDataError> {
    let file = std::fs::File::open(path)?;
    let reader = arrow::csv::ReaderBuilder::new(Arc::new(candle_schema()))
        .with_header(true)
        .build(file)?;

    let mut all_candles = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut candles = record_batch_to_candles(&batch)?;
        all_candles.append(&mut candles);
    }

    Ok(all_candles)
}
