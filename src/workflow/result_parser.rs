//! 提交成功后解析页面上的结果表格

use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::{eval_as, AutomationSession};
use crate::models::ResultTableRow;

/// 等待结果表格出现的最长时间
pub const TABLE_WAIT: Duration = Duration::from_secs(5);

/// 读取第一行结果；第 8 列（下标 7）不使用，备注在下标 8
fn table_script(table_selector: &str) -> String {
    format!(
        r#"
        (() => {{
            const row = document.querySelector({selector});
            if (!row) return null;
            const cells = row.querySelectorAll("td");
            if (cells.length < 9) return null;
            const text = (i) => (cells[i]?.textContent || "").trim();
            return {{
                barcodeNumber: text(0),
                entranceRollNumber: text(1),
                applicantName: text(2),
                entranceScore: text(3),
                course: text(4),
                stream: text(5),
                socialCategory: text(6),
                remarks: text(8)
            }};
        }})()
        "#,
        selector = serde_json::Value::String(format!("{} tbody tr", table_selector))
    )
}

/// 解析结果表格
///
/// 表格缺失或格式不符时返回 `None`，调用方只使用接口数据。
pub async fn parse_result_table(
    session: &dyn AutomationSession,
    table_selector: &str,
) -> Option<ResultTableRow> {
    if let Err(e) = session.wait_for_element(table_selector, TABLE_WAIT).await {
        warn!("⚠️  结果表格未出现，仅使用接口数据: {}", e);
        return None;
    }

    match eval_as::<Option<ResultTableRow>>(session, &table_script(table_selector)).await {
        Ok(row) => {
            if row.is_none() {
                debug!("结果表格列数不足，忽略");
            }
            row
        }
        Err(e) => {
            warn!("⚠️  解析结果表格失败: {}", e);
            None
        }
    }
}
