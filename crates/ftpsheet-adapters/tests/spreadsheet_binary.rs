use ftpsheet_adapters::{parse, TabularFormat};
use ftpsheet_core::Cell;
use rust_xlsxwriter::Workbook;

fn workbook_bytes() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "id").expect("write");
    sheet.write_string(0, 1, "amount").expect("write");
    sheet.write_string(0, 2, "ok").expect("write");
    sheet.write_number(1, 0, 1.0).expect("write");
    sheet.write_number(1, 1, 12.5).expect("write");
    sheet.write_boolean(1, 2, true).expect("write");
    sheet.write_number(2, 0, 2.0).expect("write");
    workbook.save_to_buffer().expect("save workbook")
}

#[test]
fn first_sheet_first_row_becomes_header() {
    let bytes = workbook_bytes();
    assert_eq!(
        TabularFormat::for_filename("report.xlsx"),
        TabularFormat::SpreadsheetBinary
    );

    let table = parse("report.xlsx", &bytes).expect("parse xlsx");
    assert_eq!(table.headers(), ["id", "amount", "ok"]);
    assert_eq!(table.row_count(), 2);
    assert_eq!(
        table.rows()[0],
        vec![Cell::Number(1.0), Cell::Number(12.5), Cell::text("TRUE")]
    );
    assert_eq!(
        table.rows()[1],
        vec![Cell::Number(2.0), Cell::Empty, Cell::Empty]
    );
}

#[test]
fn extension_case_does_not_matter() {
    let bytes = workbook_bytes();
    let table = parse("REPORT.XLSX", &bytes).expect("parse xlsx");
    assert_eq!(table.column_count(), 3);
}
