use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use csv::Writer;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ExportError;
use crate::models::ParseResult;

/// 一张待导出的发票
#[derive(Debug, Clone)]
pub struct ExportRecord {
    pub queue_id: i64,
    pub filename: String,
    pub result: ParseResult,
}

/// 导出目标 (会计系统导入文件等)
///
/// `export_date` 为导出当天, 每张发票的日期由客户送货日历推算。
/// 返回写入位置; 返回 Ok 之前不得留下部分写入的结果。
pub trait ExportSink: Send + Sync {
    fn write_batch(&self, records: &[ExportRecord], export_date: NaiveDate) -> Result<String, ExportError>;
}

const HEADER: [&str; 20] = [
    "invoice_ref",
    "queue_id",
    "customer_id",
    "customer_name",
    "customer_email",
    "branch",
    "po_number",
    "invoice_date",
    "due_date",
    "line_no",
    "system_product_name",
    "lpo_product_name",
    "quantity",
    "unit",
    "unit_price",
    "vat_rate",
    "line_net",
    "line_vat",
    "line_gross",
    "currency",
];

fn option_to_csv(val: &Option<BigDecimal>) -> String {
    val.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// CSV 文件导出: 每个已计价明细一行, 先写临时文件再改名
#[derive(Debug, Clone)]
pub struct CsvExporter {
    export_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    fn write_rows(&self, path: &Path, records: &[ExportRecord], export_date: NaiveDate) -> Result<usize, ExportError> {
        let file = File::create(path)?;
        let mut writer = Writer::from_writer(file);
        writer.write_record(HEADER)?;

        let mut rows = 0;
        for record in records {
            let result = &record.result;
            let dates = result
                .delivery_calendar
                .invoice_dates(export_date, result.payment_terms_days);
            let branch = result
                .branch
                .as_ref()
                .map(|b| b.branch_name.clone())
                .unwrap_or_default();

            for (line_no, item) in result.priced_items().enumerate() {
                writer.write_record(&[
                    format!("LPO-{}", record.queue_id),
                    record.queue_id.to_string(),
                    result.customer_id.to_string(),
                    result.customer_name.clone(),
                    result.customer_email.clone(),
                    branch.clone(),
                    result.po_number.clone().unwrap_or_default(),
                    dates.invoice_date.to_string(),
                    dates.due_date.to_string(),
                    (line_no + 1).to_string(),
                    item.system_product_name.clone(),
                    item.lpo_product_name.clone(),
                    option_to_csv(&item.quantity),
                    item.unit.clone(),
                    item.unit_price.to_string(),
                    item.vat_rate.to_string(),
                    option_to_csv(&item.line_net),
                    option_to_csv(&item.line_vat),
                    option_to_csv(&item.line_gross),
                    item.currency.clone(),
                ])?;
                rows += 1;
            }
        }

        writer.flush()?;
        Ok(rows)
    }
}

impl ExportSink for CsvExporter {
    fn write_batch(&self, records: &[ExportRecord], export_date: NaiveDate) -> Result<String, ExportError> {
        fs::create_dir_all(&self.export_dir)?;

        let first = records.first().map(|r| r.queue_id).unwrap_or_default();
        let name = format!(
            "invoices_{}_{}_{}.csv",
            export_date.format("%Y%m%d"),
            first,
            records.len()
        );
        let path = self.export_dir.join(&name);
        let tmp_path = self.export_dir.join(format!(".{}.tmp", name));

        match self.write_rows(&tmp_path, records, export_date) {
            Ok(rows) => {
                fs::rename(&tmp_path, &path)?;
                info!("Exported {} invoice(s), {} row(s) to {}", records.len(), rows, path.display());
                Ok(path.display().to_string())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }
}
