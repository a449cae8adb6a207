//! CSS selectors for the PayTrust bills center.

// Login
pub const USERNAME_INPUT: &str = "#UserName input[type=text]";
pub const USERNAME_CONTINUE: &str = "#UserName > div.buttons > button";
pub const AUTH_FORM: &str = "div.page.authentication > div.region.right > form";
pub const PASSWORD_INPUT: &str = "#Password";
pub const SIGN_ON_BUTTON: &str =
    "body > div > div.region.right > form:nth-child(3) > div.buttons > button.button.primary";
pub const NOTICE_CLOSE: &str = r#"button[title="Close"]"#;

/// Marker in the auth form markup when the site wants a phone call.
pub const OOBA_MARKER: &str = "OOBA/Preview";

// Reports
pub const PAYMENT_HISTORY_TAB: &str = "#RightRegionContentPlaceHolder_SidebarTabMenu_PaymentHistory > a";
pub const REPORTS_LINK: &str =
    "#RightRegionContentPlaceHolder_PaymentHistory_PaymentTable_ReportsLink_Input";
pub const REPORT_DROPDOWN: &str = "#Reports_ViewReportsReportDropdown_Input_Responsive";
pub const REPORT_DROPDOWN_ITEMS: &str =
    "#Reports_ViewReportsReportDropdown_Input_Responsive > div.responsiveDropDownOptions > div > div";
pub const REPORT_TITLE: &str = "#Reports_ViewReportViewDiv > div.container.sectionsContainer > div.section.content.contentSection.clear > div.report-title > h1";
pub const REPORT_TOTAL: &str = "tr.total > td.totalLabel > div.totalDiv > span.totalLabel";

/// Dropdown entry that shows every payment.
pub const ALL_DATES: &str = "Include All Dates";

// Bills
pub const BILL_BUTTONS: &str = "tr > td.column.bill > button.billIcon";
pub const PAYEE_CELL: &str = "td.column.payee";
pub const BILL_MODAL_CLOSE: &str =
    "#ViewBills > div.view.extraLarge > div > div.section.buttons.buttonsSection > button";
pub const BILL_SELECT: &str = "#ViewBills > div.view.extraLarge > div > div.container.sectionsContainer > div.section.content.contentSection.clear > div.area.billselection.clear > div > div.field.billSelection.clear > select";
pub const BILL_FRAME: &str = "#ViewBills iframe";
pub const BILL_NEW_WINDOW_LINK: &str = "#ViewBills > div.view.extraLarge > div > div.container.sectionsContainer > div.section.content.contentSection.clear > div.area.billimage.clear > div.areaHeader > span.newWindow > a";
pub const BILL_DIALOG_CLOSE: &str = "div.ui-dialog > div.ui-dialog-titlebar > button.ui-dialog-titlebar-close";
