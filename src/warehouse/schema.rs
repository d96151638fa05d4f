/// Warehouse DDL, applied with `CREATE TABLE IF NOT EXISTS` on connect.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        symbol TEXT PRIMARY KEY,
        company_name TEXT NOT NULL,
        sector TEXT,
        industry TEXT,
        exchange TEXT,
        market_cap REAL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_prices (
        price_key INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        price_date DATE NOT NULL,
        open_price REAL,
        high_price REAL,
        low_price REAL,
        close_price REAL NOT NULL,
        adj_close REAL,
        volume INTEGER,
        UNIQUE(symbol, price_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fundamentals (
        financial_key INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        fiscal_date DATE NOT NULL,
        period_type TEXT NOT NULL,
        filing_date DATE,
        accepted_date DATETIME,
        revenue REAL,
        cost_of_revenue REAL,
        gross_profit REAL,
        operating_expenses REAL,
        operating_income REAL,
        net_income REAL,
        eps REAL,
        eps_diluted REAL,
        operating_cash_flow REAL,
        investing_cash_flow REAL,
        financing_cash_flow REAL,
        free_cash_flow REAL,
        capital_expenditures REAL,
        dividends_paid REAL,
        shares_outstanding REAL,
        total_assets REAL,
        current_assets REAL,
        total_liabilities REAL,
        current_liabilities REAL,
        total_equity REAL,
        cash_and_equivalents REAL,
        total_debt REAL,
        net_debt REAL,
        UNIQUE(symbol, fiscal_date, period_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fundamentals_ttm (
        ttm_key INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        calculation_date DATE NOT NULL,
        accepted_date DATETIME NOT NULL,
        quarters_included INTEGER NOT NULL,
        oldest_quarter_date DATE NOT NULL,
        newest_quarter_date DATE NOT NULL,
        ttm_revenue REAL,
        ttm_cost_of_revenue REAL,
        ttm_gross_profit REAL,
        ttm_operating_expenses REAL,
        ttm_operating_income REAL,
        ttm_net_income REAL,
        ttm_eps REAL,
        ttm_eps_diluted REAL,
        ttm_operating_cash_flow REAL,
        ttm_investing_cash_flow REAL,
        ttm_financing_cash_flow REAL,
        ttm_free_cash_flow REAL,
        ttm_capital_expenditures REAL,
        ttm_dividends_paid REAL,
        latest_shares_outstanding REAL,
        latest_total_assets REAL,
        latest_current_assets REAL,
        latest_total_liabilities REAL,
        latest_current_liabilities REAL,
        latest_total_equity REAL,
        latest_cash_and_equivalents REAL,
        latest_total_debt REAL,
        latest_net_debt REAL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(symbol, calculation_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS financial_ratios (
        ratio_key INTEGER PRIMARY KEY AUTOINCREMENT,
        financial_key INTEGER NOT NULL UNIQUE,
        symbol TEXT NOT NULL,
        fiscal_date DATE NOT NULL,
        period_type TEXT NOT NULL,
        gross_margin REAL,
        operating_margin REAL,
        profit_margin REAL,
        roe REAL,
        roa REAL,
        current_ratio REAL,
        quick_ratio REAL,
        debt_to_equity REAL,
        debt_to_assets REAL,
        asset_turnover REAL,
        book_value_per_share REAL,
        created_at DATETIME NOT NULL,
        FOREIGN KEY (financial_key) REFERENCES fundamentals(financial_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS market_metrics (
        metric_key INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        price_date DATE NOT NULL,
        financial_key INTEGER,
        fiscal_period TEXT NOT NULL,
        fiscal_date DATE,
        close_price REAL NOT NULL,
        market_cap REAL,
        enterprise_value REAL,
        pe_ratio REAL,
        pe_ratio_ttm REAL,
        pb_ratio REAL,
        ps_ratio REAL,
        ps_ratio_ttm REAL,
        ev_to_revenue REAL,
        ev_to_revenue_ttm REAL,
        ev_to_ebitda REAL,
        ev_to_ebit REAL,
        dividend_yield REAL,
        payout_ratio REAL,
        peg_ratio REAL,
        is_ttm BOOLEAN NOT NULL DEFAULT 0,
        quarterly_accepted_date DATETIME,
        ttm_accepted_date DATETIME,
        created_at DATETIME NOT NULL,
        UNIQUE(symbol, price_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS etl_job_history (
        job_id TEXT PRIMARY KEY,
        job_name TEXT NOT NULL,
        status TEXT NOT NULL,
        start_time DATETIME NOT NULL,
        end_time DATETIME,
        duration_seconds REAL,
        records_extracted INTEGER NOT NULL DEFAULT 0,
        records_transformed INTEGER NOT NULL DEFAULT 0,
        records_loaded INTEGER NOT NULL DEFAULT 0,
        error_count INTEGER NOT NULL DEFAULT 0,
        metadata TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS etl_job_errors (
        error_key INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        error_message TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        FOREIGN KEY (job_id) REFERENCES etl_job_history(job_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS etl_data_quality_issues (
        issue_key INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        table_name TEXT NOT NULL,
        record_identifier TEXT NOT NULL,
        issue_description TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        FOREIGN KEY (job_id) REFERENCES etl_job_history(job_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_fundamentals_symbol_accepted ON fundamentals(symbol, accepted_date)",
    "CREATE INDEX IF NOT EXISTS idx_ttm_symbol_accepted ON fundamentals_ttm(symbol, accepted_date)",
    "CREATE INDEX IF NOT EXISTS idx_prices_date ON daily_prices(price_date)",
];
