//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, loans, members, reports, settings, stats};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pustaka API",
        version = "1.0.0",
        description = "Library loan ledger and reporting REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Catalog
        books::list_books,
        books::get_book,
        books::create_book,
        // Members
        members::list_members,
        members::get_member,
        members::create_member,
        // Loans
        loans::create_loan,
        loans::list_loans,
        loans::get_loan,
        loans::get_member_loans,
        loans::return_loan,
        loans::settle_fine,
        loans::fine_preview,
        loans::delete_loan,
        // Stats
        stats::dashboard,
        stats::overdue_loans,
        stats::popular_books,
        stats::activity,
        // Reports
        reports::generate_report,
        // Settings
        settings::get_settings,
    ),
    components(
        schemas(
            // Catalog
            crate::models::book::Book,
            crate::models::book::CreateBook,
            // Members
            crate::models::member::Member,
            crate::models::member::MemberShort,
            crate::models::member::CreateMember,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanItem,
            crate::models::loan::LoanStatus,
            crate::models::loan::FineStatus,
            crate::models::loan::ItemCondition,
            crate::models::loan::ReturnCondition,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanItemDetails,
            crate::models::loan::CreateLoan,
            crate::models::loan::BookReturn,
            crate::models::loan::ReturnLoan,
            crate::models::loan::FinePreview,
            // Stats
            crate::models::report::DashboardStats,
            crate::models::report::OverdueLoan,
            crate::models::report::PopularBook,
            crate::models::report::ActivityPoint,
            // Reports
            crate::models::report::ReportKind,
            crate::models::report::Report,
            crate::models::report::LoanReportRow,
            crate::models::report::FineReportRow,
            crate::models::report::OverdueReturnRow,
            crate::models::report::MemberActivityRow,
            crate::models::report::BookInventoryRow,
            // Settings
            settings::LoanSettings,
            settings::SettingsResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "members", description = "Member management"),
        (name = "loans", description = "Loans, returns and fines"),
        (name = "stats", description = "Statistics"),
        (name = "reports", description = "Ad-hoc reports"),
        (name = "settings", description = "Running loan policy")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
